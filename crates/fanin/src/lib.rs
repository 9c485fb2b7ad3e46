//! Fan-in worker pool with synchronized acknowledgment.
//!
//! Any number of producers each emit a gapless sequence of [`WorkItem`]s on
//! a private channel. The merger relays every channel onto one shared stream
//! that a single [`Consumer`] drains. In [`Mode::Synchronized`] pools the
//! consumer also sends an [`AckToken`] back to a producer before that
//! producer may build its next item, and [`Consumer::run_rounds`] uses that to
//! keep every producer within one round of the others.
//!
//! ```no_run
//! # async fn demo() -> Result<(), confluence_fanin::ConsumeError> {
//! use std::time::Duration;
//!
//! use confluence_fanin::{ConstantPayload, Mode, Pool, ProducerSpec};
//!
//! let mut pool = Pool::builder(Mode::Synchronized)
//! 	.producer(ProducerSpec::new("one", ConstantPayload(1)))
//! 	.producer(ProducerSpec::new("two", ConstantPayload(2)))
//! 	.build();
//! pool.consumer().run_rounds(10, |delivery| println!("{delivery:?}")).await?;
//! let report = pool.shutdown(Duration::from_secs(1)).await;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

mod ack;
mod config;
mod consumer;
mod error;
mod exit;
mod generator;
mod item;
mod merge;
mod pool;
mod producer;

pub use ack::{AckOutcome, AckRouter};
pub use config::PoolConfig;
pub use consumer::{Consumer, ConsumerReport, ConsumerStop, Round};
pub use error::{ConfigError, ConsumeError, GeneratorError, GeneratorFailure};
pub use exit::{ExitReason, TaskExit, TaskKind};
pub use generator::{ConstantPayload, DEFAULT_PAYLOAD_BOUND, RandomPayload, ValueGenerator};
pub use item::{
	AckReceiver, AckSender, AckToken, CHANNEL_CAPACITY, Delivery, ItemReceiver, ItemSender, ProducerId, WorkItem, ack_channel, delivery_origin,
	item_channel,
};
pub use merge::merge;
pub use pool::{ExitReport, Mode, Pool, PoolBuilder};
pub use producer::{DEFAULT_MAX_SLEEP, ProducerSpec, spawn_producer};
