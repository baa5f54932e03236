// Delta race: run every registered codec over the same input and keep the
// smallest successful delta that is still smaller than the raw target.
//
// Source and target are read once into master buffers.  Each codec task
// takes its own copy of both under a single lock and then encodes without
// touching shared state.  With the `parallel` feature the tasks run on the
// rayon pool; otherwise they run one after another in registration order.

use std::io::{self, Read};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use parking_lot::Mutex;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::DeltaCandidateResult;
use super::codec::{BsdiffCodec, DeltaCodec};
use crate::package::entry::RESERVED_SUFFIXES;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("codec extension `{0}` is already registered")]
    DuplicateExtension(String),
    #[error("codec extension `{0}` is reserved by the package layout")]
    ReservedExtension(String),
    #[error("codec extension `{0}` must be a non-empty name without dots or separators")]
    InvalidExtension(String),
}

// ---------------------------------------------------------------------------
// DeltaManager
// ---------------------------------------------------------------------------

/// Registry of delta codecs and the race between them.
#[derive(Clone)]
pub struct DeltaManager {
    codecs: Vec<Arc<dyn DeltaCodec>>,
}

impl std::fmt::Debug for DeltaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.codecs.iter().map(|c| c.name()))
            .finish()
    }
}

impl Default for DeltaManager {
    /// The built-in bsdiff codecs (zlib, and LZMA with the `lzma` feature).
    fn default() -> Self {
        let mut codecs: Vec<Arc<dyn DeltaCodec>> = vec![Arc::new(BsdiffCodec::zlib())];
        #[cfg(feature = "lzma")]
        codecs.push(Arc::new(BsdiffCodec::lzma()));
        Self { codecs }
    }
}

impl DeltaManager {
    /// A manager with no codecs; every race returns `failed()`.
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Add a codec to the race.
    ///
    /// Registration order is the tie-break order when two codecs produce
    /// deltas of equal size.
    pub fn register(&mut self, codec: Arc<dyn DeltaCodec>) -> Result<(), RegistryError> {
        let ext = codec.extension();
        if ext.is_empty() || ext.contains(['.', '/', '\\']) {
            return Err(RegistryError::InvalidExtension(ext.to_string()));
        }
        if RESERVED_SUFFIXES.contains(&ext) {
            return Err(RegistryError::ReservedExtension(ext.to_string()));
        }
        if self.codec_for_extension(ext).is_some() {
            return Err(RegistryError::DuplicateExtension(ext.to_string()));
        }
        self.codecs.push(codec);
        Ok(())
    }

    /// Registered codecs in registration order.
    pub fn codecs(&self) -> impl Iterator<Item = &dyn DeltaCodec> {
        self.codecs.iter().map(|c| c.as_ref())
    }

    /// Resolve the codec that owns an archive extension.
    pub fn codec_for_extension(&self, extension: &str) -> Option<&dyn DeltaCodec> {
        self.codecs()
            .find(|c| c.extension() == extension)
    }

    /// Read `source` and `target` fully and race every codec over them.
    pub fn create_delta<S: Read, T: Read>(
        &self,
        mut source: S,
        mut target: T,
    ) -> io::Result<DeltaCandidateResult> {
        let mut source_buf = Vec::new();
        source.read_to_end(&mut source_buf)?;
        let mut target_buf = Vec::new();
        target.read_to_end(&mut target_buf)?;
        Ok(self.create_delta_from_slices(&source_buf, &target_buf))
    }

    /// Race every codec over in-memory buffers.
    pub fn create_delta_from_slices(&self, source: &[u8], target: &[u8]) -> DeltaCandidateResult {
        let results = self.race(source, target);
        let winner = select(results, target.len());
        if winner.is_success() {
            info!(
                "delta: {} won with {} bytes for a {}-byte target",
                winner.codec,
                winner.len(),
                target.len()
            );
        } else {
            info!(
                "delta: no viable delta for a {}-byte target, shipping full file",
                target.len()
            );
        }
        winner
    }

    fn race(&self, source: &[u8], target: &[u8]) -> Vec<DeltaCandidateResult> {
        let master = Mutex::new((source, target));

        let run = |codec: &Arc<dyn DeltaCodec>| -> DeltaCandidateResult {
            let (source, target) = {
                let guard = master.lock();
                (guard.0.to_vec(), guard.1.to_vec())
            };

            let started = Instant::now();
            match codec.create_delta(&source, &target) {
                Ok(output) => {
                    debug!(
                        "delta: {} produced {} bytes in {:?}",
                        codec.name(),
                        output.len(),
                        started.elapsed()
                    );
                    DeltaCandidateResult {
                        codec: codec.name().to_string(),
                        extension: codec.extension().to_string(),
                        output,
                        success: true,
                    }
                }
                Err(e) => {
                    warn!("delta: {} failed, excluded from selection: {e}", codec.name());
                    DeltaCandidateResult {
                        codec: codec.name().to_string(),
                        extension: codec.extension().to_string(),
                        output: Vec::new(),
                        success: false,
                    }
                }
            }
        };

        #[cfg(feature = "parallel")]
        let results = self.codecs.par_iter().map(run).collect();
        #[cfg(not(feature = "parallel"))]
        let results = self.codecs.iter().map(run).collect();

        results
    }
}

/// Keep the smallest successful result below `target_len`; the earliest
/// wins a tie.
fn select(results: Vec<DeltaCandidateResult>, target_len: usize) -> DeltaCandidateResult {
    let mut best: Option<DeltaCandidateResult> = None;
    for candidate in results {
        if !candidate.success || candidate.len() >= target_len {
            continue;
        }
        if best.as_ref().is_none_or(|b| candidate.len() < b.len()) {
            best = Some(candidate);
        }
    }
    best.unwrap_or_else(DeltaCandidateResult::failed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsdiff::PatchError;
    use crate::delta::CodecError;

    fn candidate(codec: &str, len: usize, success: bool) -> DeltaCandidateResult {
        DeltaCandidateResult {
            codec: codec.into(),
            extension: codec.into(),
            output: vec![0; len],
            success,
        }
    }

    struct Named(&'static str);

    impl DeltaCodec for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn extension(&self) -> &str {
            self.0
        }
        fn create_delta(&self, _: &[u8], _: &[u8]) -> Result<Vec<u8>, CodecError> {
            Ok(Vec::new())
        }
        fn apply_delta(
            &self,
            _: &[u8],
            _: &[u8],
            _: &mut dyn std::io::Write,
        ) -> Result<u64, PatchError> {
            Ok(0)
        }
    }

    #[test]
    fn select_smallest_success() {
        let results = vec![
            candidate("a", 50, true),
            candidate("b", 10, false),
            candidate("c", 20, true),
        ];
        let winner = select(results, 100);
        assert_eq!(winner.codec, "c");
    }

    #[test]
    fn select_first_on_tie() {
        let results = vec![candidate("a", 20, true), candidate("b", 20, true)];
        assert_eq!(select(results, 100).codec, "a");
    }

    #[test]
    fn select_rejects_results_not_smaller_than_target() {
        let results = vec![candidate("a", 100, true), candidate("b", 120, true)];
        let winner = select(results, 100);
        assert!(!winner.is_success());
        assert_eq!(winner, DeltaCandidateResult::failed());
    }

    #[test]
    fn default_registry_has_bsdiff() {
        let manager = DeltaManager::default();
        assert!(manager.codec_for_extension("bsdiff").is_some());
        #[cfg(feature = "lzma")]
        assert!(manager.codec_for_extension("xbsdiff").is_some());
        assert!(manager.codec_for_extension("new").is_none());
    }

    #[test]
    fn register_rejects_reserved_and_duplicate() {
        let mut manager = DeltaManager::empty();
        manager.register(Arc::new(Named("fast"))).unwrap();
        assert!(matches!(
            manager.register(Arc::new(Named("fast"))),
            Err(RegistryError::DuplicateExtension(_))
        ));
        for reserved in ["new", "moved", "diff", "shasum"] {
            assert!(matches!(
                manager.register(Arc::new(Named(reserved))),
                Err(RegistryError::ReservedExtension(_))
            ));
        }
        assert!(matches!(
            manager.register(Arc::new(Named("a.b"))),
            Err(RegistryError::InvalidExtension(_))
        ));
        assert_eq!(manager.codecs().count(), 1);
    }

    #[test]
    fn empty_manager_always_fails() {
        let result = DeltaManager::empty().create_delta_from_slices(b"abc", b"abd");
        assert!(!result.is_success());
    }

    #[test]
    fn create_delta_reads_streams() {
        let source = vec![9u8; 4096];
        let mut target = source.clone();
        target[10] = 1;
        let result = DeltaManager::default()
            .create_delta(&source[..], &target[..])
            .unwrap();
        assert!(result.is_success());
        assert!(result.len() < target.len());
    }
}
