//! Stealth and Anti-Detection Module
//!
//! Compiles a [`Fingerprint`] into an [`OverrideProgram`]: a JavaScript program that,
//! once registered to run before any page script, makes the browser report the
//! fingerprint's values instead of its real ones.
//!
//! # Modules
//!
//! - `directive` - intermediate representation and the fingerprint lowering
//! - `render` - single-pass JavaScript emission
//! - `noise` - Rust mirror of the seeded canvas/audio/text noise
//!
//! # Security Considerations
//!
//! The most critical aspect of anti-detection is ensuring `navigator.webdriver` is NEVER
//! exposed as `true`. The synthesizer binds it to `false` whatever the fingerprint says.
//!
//! # Example
//!
//! ```rust
//! use profile_mask::fingerprint::Fingerprint;
//! use profile_mask::stealth::synthesize;
//!
//! let fingerprint = Fingerprint::fallback();
//! let program = synthesize(&fingerprint);
//!
//! assert_eq!(program, synthesize(&fingerprint));
//! assert!(program.source().contains("\"hardwareConcurrency\", 8"));
//! ```

pub mod directive;
pub mod noise;
pub mod render;

pub use directive::{compile, Directive, JsValue, Target};
pub use noise::NoiseRng;

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::fingerprint::Fingerprint;

#[derive(PartialEq)]
struct ProgramInner {
    source: String,
    directives: Vec<Directive>,
    key: String,
    guard: String,
}

/// Compiled override program. Immutable and cheap to clone.
#[derive(Clone, PartialEq)]
pub struct OverrideProgram {
    inner: Arc<ProgramInner>,
}

impl OverrideProgram {
    fn new(directives: Vec<Directive>, guard: String) -> Self {
        let source = render::render(&directives, &guard);
        let key = hex::encode(Sha256::digest(source.as_bytes()));
        Self {
            inner: Arc::new(ProgramInner {
                source,
                directives,
                key,
                guard,
            }),
        }
    }

    /// JavaScript source to register for every new document.
    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.inner.source.as_bytes()
    }

    /// Directives the source was rendered from.
    pub fn directives(&self) -> &[Directive] {
        &self.inner.directives
    }

    /// Hex SHA-256 of the source.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Name of the idempotence marker the program defines on `window`.
    pub fn guard(&self) -> &str {
        &self.inner.guard
    }

    pub fn len(&self) -> usize {
        self.inner.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.source.is_empty()
    }
}

impl fmt::Debug for OverrideProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideProgram")
            .field("key", &self.key())
            .field("guard", &self.guard())
            .field("directives", &self.inner.directives.len())
            .field("bytes", &self.len())
            .finish()
    }
}

/// Guard property name, derived from the noise seed so that programs for
/// different fingerprints do not share it.
pub fn guard_name(fingerprint: &Fingerprint) -> String {
    format!("__pm_{:08x}", fingerprint.noise_seed.words()[0])
}

/// Compiles a fingerprint into its override program.
///
/// Pure: identical fingerprints yield byte-identical programs.
pub fn synthesize(fingerprint: &Fingerprint) -> OverrideProgram {
    OverrideProgram::new(compile(fingerprint), guard_name(fingerprint))
}
