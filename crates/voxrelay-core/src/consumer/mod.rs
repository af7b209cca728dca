//! Consumer side: reordering, speech queueing and conversation control

mod controller;
mod reassembly;
mod sink;
mod speech_queue;

pub use controller::{ConversationController, OriginLink};
pub use reassembly::{ReassemblyBuffer, Release};
pub use sink::{SinkFactory, SinkSlot, SinkTicket, SynthesisSink};
pub use speech_queue::SpeechQueue;
