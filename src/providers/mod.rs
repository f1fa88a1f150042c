mod gocd;

pub use gocd::{BuildStatus, GoCdClient};
