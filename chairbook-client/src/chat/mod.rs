//! Chat client: thread state, participants, typing
//!
//! | 组件 | 职责 |
//! |------|------|
//! | `ChatThreadSynchronizer` | One open thread: messages, send gate, bus pushes |
//! | `ParticipantDirectory` | Sender resolution with single-flight roster refresh |
//! | `TypingTracker` | Local debounce and remote indicator expiry |

pub mod participants;
pub mod synchronizer;
pub mod typing;

pub use participants::ParticipantDirectory;
pub use synchronizer::ChatThreadSynchronizer;
pub use typing::{InputUpdate, TypingTracker};
