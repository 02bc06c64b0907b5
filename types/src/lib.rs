pub mod context;
pub mod events;
pub mod ticket;
pub mod turn;

pub use context::AugmentationContext;
pub use events::{ClientEvent, StructuredEvent};
pub use ticket::SessionTicket;
pub use turn::{Speaker, Turn, TurnState};
