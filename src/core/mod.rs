// Domain-layer modules and shared errors/models
pub mod normalize {
    pub use crate::normalize::*;
}

pub mod resolution {
    pub use crate::resolution::*;
}

pub mod pipeline {
    pub use crate::pipeline::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
