pub mod key;
pub mod record;
pub mod scalar;
pub mod schema;
