mod ids;

pub mod helpers;
mod secret;

pub use ids::{AuthorisationId, ConsentId, IdParseError, PaymentId, TppId};
pub use secret::Secret;
