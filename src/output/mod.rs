mod styling;
mod summary;
mod tables;

pub use styling::{dim, magenta_bold};
pub use summary::{print_summary, GraphView};

/// Prints the pipegraph banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🔀 pipegraph"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("CI pipeline dependency graphs")
    );
}
