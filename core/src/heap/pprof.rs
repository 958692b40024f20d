//! Generated protobuf bindings for the pprof wire format.
//!
//! See `proto/profile.proto` for the schema and `build.rs` for codegen.

#![allow(clippy::all)]

include!(concat!(env!("OUT_DIR"), "/idlescope.pprof.rs"));
