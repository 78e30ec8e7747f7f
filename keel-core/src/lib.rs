//! Keel Core
//!
//! Core types for the Keel step engine.
//!
//! This crate contains:
//! - Domain types: the compiled pipeline (`Spec`), its steps, volumes and network
//! - Image references: parsing and normalization of container image names

pub mod domain;
pub mod image;

pub use domain::{
    Auth, Network, Platform, PullPolicy, Spec, SpecError, State, Step, Volume, VolumeEmptyDir,
    VolumeHostPath, VolumeMount,
};
pub use image::{ImageRef, ImageRefError};
