mod http;
mod state;
mod websocket;

pub use http::serve;
pub use state::{AppState, Hub, LastRefresh, UPDATE_EVENT};
