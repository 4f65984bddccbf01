//! Wire entities - typed views of the JSON objects carried by gateway events

mod channel;
mod guild;
mod user;
mod voice_state;

pub use channel::{Channel, ChannelType};
pub use guild::{Guild, UnavailableGuild};
pub use user::User;
pub use voice_state::VoiceState;
