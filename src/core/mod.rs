// Domain-layer modules and shared errors/models
pub mod orchestrator {
    pub use crate::orchestrator::*;
}

pub mod validation {
    pub use crate::validation::*;
}

pub mod scoring {
    pub use crate::scoring::*;
}

pub mod compliance {
    pub use crate::compliance::*;
}

pub mod store {
    pub use crate::store::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
