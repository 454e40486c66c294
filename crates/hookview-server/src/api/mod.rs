pub mod error;
pub mod health;
pub mod payload;
pub mod response;
pub mod state;
pub mod webhooks;

pub use error::ApiError;
pub use response::ApiResponse;
pub use state::AppState;
