pub mod embed_id;
pub mod linear;
pub mod lstm;

pub use embed_id::{EmbedId, EmbedIdConfig};
pub use linear::{Linear, LinearConfig};
pub use lstm::{extract_gates, restore_gates, Lstm, LstmConfig};
