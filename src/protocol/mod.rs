//! MiniMQ wire protocol
//!
//! The broker speaks a plain-text, `\n`-terminated line protocol:
//!
//! | Direction       | Line                                   |
//! |-----------------|----------------------------------------|
//! | client → broker | `PRODUCE:<topic>:<json>`               |
//! | client → broker | `CONSUME:<topic>`                      |
//! | broker → client | `NO_MSG`                               |
//! | broker → client | `<message_id>:::<reserved>:::<json>`   |
//! | client → broker | `ACK:<message_id>`                     |

pub mod codec;
pub mod topics;

pub use codec::*;
pub use topics::*;
