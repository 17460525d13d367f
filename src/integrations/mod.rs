//! External service integrations.

pub mod ai_client {
    pub use crate::ai_client::*;
}

pub mod services {
    pub use crate::services::*;
}

pub mod circuit_breaker {
    pub use crate::circuit_breaker::*;
}
