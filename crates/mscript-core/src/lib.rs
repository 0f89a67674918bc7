//! MethodSCRIPT Core - protocol types and decoding for MethodSCRIPT instruments
//!
//! This crate provides the I/O-free part of the protocol:
//! - Variable type registry and value decoding (offset binary + SI prefix)
//! - Data package parsing and line classification
//! - Curve aggregation into result sets
//! - Fletcher-16 checksums and bootloader chunk framing
//! - Device type detection and metadata interpretation

pub mod checksum;
pub mod curve;
pub mod device;
pub mod firmware;
pub mod observer;
pub mod package;
pub mod value;
pub mod value_type;

pub use checksum::{checksum, checksum_hex};
pub use curve::{aggregate, AggregateError, Curve, CurveAggregator, ResultSet};
pub use device::DeviceType;
pub use firmware::{FirmwareChunk, FirmwareError, UploadState, MAX_CHUNK_SIZE};
pub use observer::{NoopObserver, ProtocolObserver, TracingObserver};
pub use package::{
    parse_data_package, DataPackage, DataPackageParser, FieldErrorPolicy, ParseOptions,
    ResponseLine, SchemaPolicy,
};
pub use value::{decode, decode_value, DecodeError, MeasurementValue, Metadata, PrefixPolicy};
pub use value_type::{lookup, ValueTypeCode, ValueTypeInfo};
