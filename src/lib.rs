// Trellis - declarative endpoint registration and dispatch
//
// Endpoints are declared with schemas for their parameters and responses,
// compiled into core functions and handlers, and dispatched per module in
// registration order.

// Re-export core functionality
pub use trellis_core::*;

pub use trellis_config as config;
pub use trellis_schema as schema;

#[cfg(feature = "testing")]
pub use trellis_testing as testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Completion, EndpointDef, EndpointError, EndpointRegistry, Error, Method, Raise, Reply,
        Request, Respond, Response, Scope, Token, defendpoint,
    };
    pub use trellis_config::Settings;
    pub use trellis_schema::{Schema, entry};
}
