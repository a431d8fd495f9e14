//! STEP wire protocol
//!
//! Length-prefixed frames carrying a JSON header and an optional binary
//! payload. Every other component talks to the network through this
//! module.
//!
//! # Example Usage
//!
//! ```ignore
//! use step::protocol::{write_frame, read_frame, Message, Operation, ReadPolicy};
//!
//! let request = Message::request(Operation::Get).with("token", token).with("key", "a.txt");
//! write_frame(&mut stream, &request, None, policy.max_frame_size).await?;
//! let response = read_frame(&mut stream, &policy).await?;
//! ```

pub mod codec;
pub mod constants;
pub mod error;
pub mod message;
pub mod reader;

pub use codec::{decode_stream, encode, write_frame, Frame};
pub use error::ProtocolError;
pub use message::{Direction, Message, MessageType, Operation};
pub use reader::{read_frame, ReadPolicy};

// vim: ts=4
