//! Frame identity index.
//!
//! Frames are classified in one forward pass against the most recent unique
//! frame only. A slide that comes back after a different one is a new unique
//! frame: the index never looks further back than its single reference.

use crate::{Fingerprint, Frame};
use serde::{Deserialize, Serialize};

/// A frame that starts a run of identical content. Owns its bytes on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueFrame {
    /// Dense id, `0..n` in temporal order.
    pub id: usize,
    pub frame: Frame,
}

impl UniqueFrame {
    pub fn timestamp(&self) -> f64 {
        self.frame.timestamp
    }
}

/// A frame identical to the unique frame before it. Holds no bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DuplicateReference {
    pub frame_index: u64,
    pub timestamp: f64,
    pub unique_id: usize,
}

/// A frame excluded from the index because it could not be decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedFrame {
    pub frame_index: u64,
    pub timestamp: f64,
    pub reason: String,
}

/// Result of classifying a single fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Starts a new run; carries the new unique id.
    Unique(usize),
    /// Same content as the current reference.
    DuplicateOf(usize),
}

/// Forward-scanning reducer carrying a single reference fingerprint.
#[derive(Debug, Default)]
pub struct Classifier {
    reference: Option<(Fingerprint, usize)>,
    next_id: usize,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the next fingerprint in sequence order.
    pub fn classify(&mut self, fingerprint: &Fingerprint) -> Classification {
        match self.reference {
            Some((reference, id)) if reference == *fingerprint => Classification::DuplicateOf(id),
            _ => {
                let id = self.next_id;
                self.next_id += 1;
                self.reference = Some((*fingerprint, id));
                Classification::Unique(id)
            }
        }
    }
}

/// Partition of an ordered frame sequence into unique frames and duplicates.
#[derive(Debug, Clone, Default)]
pub struct FrameIndex {
    uniques: Vec<UniqueFrame>,
    duplicates: Vec<DuplicateReference>,
    dropped: Vec<DroppedFrame>,
}

impl FrameIndex {
    /// Build the index from fingerprinting results in sequence order.
    ///
    /// Failed frames are recorded as dropped and take no part in
    /// classification; their time is absorbed by the preceding unique frame.
    pub fn build<I>(results: I) -> Self
    where
        I: IntoIterator<Item = Result<Frame, DroppedFrame>>,
    {
        let mut index = Self::default();
        let mut classifier = Classifier::new();

        for result in results {
            match result {
                Ok(frame) => match classifier.classify(&frame.fingerprint) {
                    Classification::Unique(id) => {
                        tracing::trace!(
                            "Frame {} at {:.3}s is unique #{} ({})",
                            frame.index,
                            frame.timestamp,
                            id,
                            frame.fingerprint.short()
                        );
                        index.uniques.push(UniqueFrame { id, frame });
                    }
                    Classification::DuplicateOf(unique_id) => {
                        index.duplicates.push(DuplicateReference {
                            frame_index: frame.index,
                            timestamp: frame.timestamp,
                            unique_id,
                        });
                    }
                },
                Err(dropped) => index.dropped.push(dropped),
            }
        }

        tracing::debug!(
            "Indexed {} frames: {} unique, {} duplicate, {} dropped",
            index.frame_count(),
            index.uniques.len(),
            index.duplicates.len(),
            index.dropped.len()
        );

        index
    }

    /// Build from frames that are all known to be decodable.
    pub fn from_frames(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self::build(frames.into_iter().map(Ok))
    }

    pub fn uniques(&self) -> &[UniqueFrame] {
        &self.uniques
    }

    pub fn duplicates(&self) -> &[DuplicateReference] {
        &self.duplicates
    }

    pub fn dropped(&self) -> &[DroppedFrame] {
        &self.dropped
    }

    /// Number of classified frames (unique + duplicate). Dropped frames are excluded.
    pub fn frame_count(&self) -> usize {
        self.uniques.len() + self.duplicates.len()
    }

    /// Number of frames referencing the given unique frame, itself included.
    pub fn reference_count(&self, unique_id: usize) -> usize {
        1 + self
            .duplicates
            .iter()
            .filter(|d| d.unique_id == unique_id)
            .count()
    }

    /// Mutable access to unique frames, used to repoint sources after compression.
    pub fn uniques_mut(&mut self) -> &mut [UniqueFrame] {
        &mut self.uniques
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    pub(crate) fn fp(tag: u8) -> Fingerprint {
        Fingerprint::from_digest([tag; 32])
    }

    pub(crate) fn frames(tags: &[u8], fps: f64) -> Vec<Frame> {
        tags.iter()
            .enumerate()
            .map(|(i, &tag)| {
                Frame::new(
                    i as u64,
                    i as f64 / fps,
                    fp(tag),
                    PathBuf::from(format!("raw_{i:08}.png")),
                )
            })
            .collect()
    }

    /// Frames 0-39 share fingerprint A, frames 40-99 share fingerprint B.
    pub(crate) fn two_slide_recording() -> Vec<Frame> {
        let mut tags = vec![b'A'; 40];
        tags.extend(vec![b'B'; 60]);
        frames(&tags, 25.0)
    }

    #[test]
    fn first_frame_is_always_unique() {
        let index = FrameIndex::from_frames(frames(&[7], 25.0));
        assert_eq!(index.uniques().len(), 1);
        assert_eq!(index.uniques()[0].id, 0);
        assert!(index.duplicates().is_empty());
    }

    #[test]
    fn two_slides_yield_two_uniques() {
        let index = FrameIndex::from_frames(two_slide_recording());
        assert_eq!(index.uniques().len(), 2);
        assert_eq!(index.duplicates().len(), 98);
        assert_eq!(index.uniques()[1].frame.index, 40);
        assert_eq!(index.reference_count(0), 40);
        assert_eq!(index.reference_count(1), 60);
    }

    #[test]
    fn returning_slide_is_new_unique() {
        let index = FrameIndex::from_frames(frames(&[1, 1, 2, 2, 1, 1], 1.0));
        let ids: Vec<usize> = index.uniques().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(index.uniques()[2].frame.index, 4);
        assert_eq!(index.duplicates()[2].unique_id, 2);
    }

    #[test]
    fn counts_always_add_up() {
        let patterns: [&[u8]; 5] = [
            &[],
            &[1],
            &[1, 2, 3, 4],
            &[5, 5, 5, 5, 5],
            &[1, 2, 2, 1, 3, 3, 3, 1],
        ];
        for tags in patterns {
            let index = FrameIndex::from_frames(frames(tags, 10.0));
            assert_eq!(index.frame_count(), tags.len());
        }
    }

    #[test]
    fn duplicates_point_at_preceding_unique() {
        let index = FrameIndex::from_frames(frames(&[1, 1, 2, 2, 2, 3], 1.0));
        for dup in index.duplicates() {
            let owner = &index.uniques()[dup.unique_id];
            assert!(owner.frame.index < dup.frame_index);
            let next_unique = index.uniques().get(dup.unique_id + 1);
            if let Some(next) = next_unique {
                assert!(dup.frame_index < next.frame.index);
            }
        }
    }

    #[test]
    fn dropped_frames_are_skipped() {
        let mut results: Vec<Result<Frame, DroppedFrame>> =
            frames(&[1, 1, 2], 1.0).into_iter().map(Ok).collect();
        results.insert(
            1,
            Err(DroppedFrame {
                frame_index: 99,
                timestamp: 0.5,
                reason: "truncated".to_string(),
            }),
        );

        let index = FrameIndex::build(results);
        assert_eq!(index.uniques().len(), 2);
        assert_eq!(index.duplicates().len(), 1);
        assert_eq!(index.dropped().len(), 1);
        assert_eq!(index.frame_count(), 3);
    }

    #[test]
    fn classifier_holds_single_reference() {
        let mut classifier = Classifier::new();
        assert_eq!(classifier.classify(&fp(1)), Classification::Unique(0));
        assert_eq!(classifier.classify(&fp(1)), Classification::DuplicateOf(0));
        assert_eq!(classifier.classify(&fp(2)), Classification::Unique(1));
        assert_eq!(classifier.classify(&fp(1)), Classification::Unique(2));
    }
}
