//! Domain primitives for linkrelay.
//!
//! Pure value types with no infrastructure dependencies: who a device is,
//! which side of a link it plays, and the code a companion shows so it can be
//! claimed by a controller.

/// Device identity and role types.
pub mod device;

/// Human-presentable linking codes.
pub mod linking_code;
