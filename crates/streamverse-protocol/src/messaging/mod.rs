pub mod envelope;
pub mod receiver;
pub mod sender;

pub use envelope::{
    CreatePartyRequest, Envelope, MessageBundle, PartyNotification, PinnedMovie, PublishAck,
    PublishRequest, RosterEntry, WatchParty,
};
pub use receiver::{decrypt_own_envelope, DecryptOutcome};
pub use sender::{build_bundle, timestamp_now, OutgoingMessage};
