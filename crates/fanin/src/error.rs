//! Error types for the fan-in pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::item::ProducerId;

/// A value generator could not produce a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct GeneratorError(String);

impl GeneratorError {
	pub fn new(message: impl Into<String>) -> Self {
		Self(message.into())
	}
}

/// A generation failure delivered in-band in place of a work item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("producer {label} ({producer}) failed to generate item {sequence}: {source}")]
pub struct GeneratorFailure {
	pub producer: ProducerId,
	pub label: Arc<str>,
	pub sequence: u64,
	#[source]
	pub source: GeneratorError,
}

/// Protocol violations observed by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsumeError {
	/// A delivery named a producer the ack router does not know.
	#[error("delivery from unknown producer {0}")]
	UnknownProducer(ProducerId),

	/// A producer delivered twice inside one synchronized round.
	#[error("producer {producer} delivered item {sequence} before its previous item was acknowledged")]
	DuplicateInRound { producer: ProducerId, sequence: u64 },

	/// Round-based consumption was requested without acknowledgment channels.
	#[error("round-based consumption requires a synchronized pool")]
	NotSynchronized,
}

/// Errors loading or validating a [`PoolConfig`](crate::PoolConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or shape.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The pool would have no producers.
	#[error("at least one producer is required")]
	NoProducers,

	/// Two producers share a label.
	#[error("duplicate producer label: {0}")]
	DuplicateLabel(String),

	/// Random payloads need a positive exclusive upper bound.
	#[error("payload bound must be positive, got {0}")]
	InvalidPayloadBound(i64),
}
