//! Per-session typed settings with atomic batches.
//!
//! Writes outside a batch commit at once. Writes inside a batch stay local
//! (dirty) until [`SettingsStore::end_batch`], which publishes all of them in a
//! single revision. The remote side only ever reads [`SettingsStore::remote_view`],
//! so it sees either every write of a batch or none of them.

use std::collections::BTreeMap;

use viewlink_core::{SettingKey, SettingValue, TransportError, VideoRecordingQuality};

/// Snapshot of the committed settings as the remote side sees them.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteView {
    pub revision: u64,
    pub values: BTreeMap<SettingKey, SettingValue>,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    committed: BTreeMap<SettingKey, SettingValue>,
    pending: Option<BTreeMap<SettingKey, SettingValue>>,
    revision: u64,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with the neutral overlay and recording settings.
    pub fn with_defaults() -> Self {
        let mut committed = BTreeMap::new();
        committed.insert(SettingKey::OverlayOffsetX, SettingValue::F32(0.0));
        committed.insert(SettingKey::OverlayOffsetY, SettingValue::F32(0.0));
        committed.insert(SettingKey::OverlayScaleX, SettingValue::F32(1.0));
        committed.insert(SettingKey::OverlayScaleY, SettingValue::F32(1.0));
        committed.insert(
            SettingKey::VideoRecordingQuality,
            SettingValue::U32(VideoRecordingQuality::P480.as_u32()),
        );
        Self { committed, pending: None, revision: 0 }
    }

    /// Local read: dirty values inside an open batch shadow committed ones.
    pub fn get(&self, key: SettingKey) -> Result<SettingValue, TransportError> {
        self.pending
            .as_ref()
            .and_then(|p| p.get(&key))
            .or_else(|| self.committed.get(&key))
            .copied()
            .ok_or(TransportError::SettingUnset { key })
    }

    pub fn set(&mut self, key: SettingKey, value: SettingValue) -> Result<(), TransportError> {
        let expected = key.value_type();
        if value.value_type() != expected {
            return Err(TransportError::SettingTypeMismatch {
                key,
                expected,
                actual: value.value_type(),
            });
        }
        match self.pending.as_mut() {
            Some(pending) => {
                pending.insert(key, value);
            }
            None => {
                self.committed.insert(key, value);
                self.revision += 1;
            }
        }
        Ok(())
    }

    pub fn begin_batch(&mut self) -> Result<(), TransportError> {
        if self.pending.is_some() {
            return Err(TransportError::BatchAlreadyOpen);
        }
        self.pending = Some(BTreeMap::new());
        Ok(())
    }

    /// Publish every dirty write as one revision. Returns the keys written.
    pub fn end_batch(&mut self) -> Result<Vec<SettingKey>, TransportError> {
        let pending = self.pending.take().ok_or(TransportError::NoOpenBatch)?;
        let keys: Vec<SettingKey> = pending.keys().copied().collect();
        if !pending.is_empty() {
            self.committed.extend(pending);
            self.revision += 1;
        }
        Ok(keys)
    }

    /// Drop an open batch without publishing anything.
    pub fn abort_batch(&mut self) {
        self.pending = None;
    }

    pub fn is_batch_open(&self) -> bool {
        self.pending.is_some()
    }

    /// Keys written inside the open batch and not yet published.
    pub fn dirty_keys(&self) -> Vec<SettingKey> {
        self.pending
            .as_ref()
            .map(|p| p.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn remote_view(&self) -> RemoteView {
        RemoteView { revision: self.revision, values: self.committed.clone() }
    }

    /// Write performed by the remote side; never batched.
    pub fn commit_remote(&mut self, key: SettingKey, value: SettingValue) {
        self.committed.insert(key, value);
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unbatched_writes_commit_immediately() {
        let mut store = SettingsStore::with_defaults();
        store.set(SettingKey::OverlayScaleX, SettingValue::F32(2.0)).unwrap();
        assert_eq!(store.remote_view().values[&SettingKey::OverlayScaleX], SettingValue::F32(2.0));
        assert_eq!(store.remote_view().revision, 1);
    }

    #[test]
    fn batch_publishes_width_and_height_together() {
        let mut store = SettingsStore::new();
        store.begin_batch().unwrap();
        store.set(SettingKey::ImageWidth, SettingValue::U16(640)).unwrap();
        assert!(store.remote_view().values.get(&SettingKey::ImageWidth).is_none());
        assert_eq!(store.get(SettingKey::ImageWidth).unwrap(), SettingValue::U16(640));
        store.set(SettingKey::ImageHeight, SettingValue::U16(480)).unwrap();
        assert_eq!(store.dirty_keys(), vec![SettingKey::ImageWidth, SettingKey::ImageHeight]);

        let keys = store.end_batch().unwrap();
        assert_eq!(keys.len(), 2);
        let view = store.remote_view();
        assert_eq!(view.revision, 1);
        assert_eq!(view.values[&SettingKey::ImageWidth], SettingValue::U16(640));
        assert_eq!(view.values[&SettingKey::ImageHeight], SettingValue::U16(480));
    }

    #[test]
    fn batch_misuse_is_rejected() {
        let mut store = SettingsStore::new();
        assert_eq!(store.end_batch(), Err(TransportError::NoOpenBatch));
        store.begin_batch().unwrap();
        assert_eq!(store.begin_batch(), Err(TransportError::BatchAlreadyOpen));
        store.abort_batch();
        assert!(!store.is_batch_open());
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let mut store = SettingsStore::new();
        let err = store.set(SettingKey::ImageWidth, SettingValue::F32(1.0)).unwrap_err();
        assert!(matches!(err, TransportError::SettingTypeMismatch { key: SettingKey::ImageWidth, .. }));
    }

    proptest! {
        #[test]
        fn batch_is_never_observed_partially(
            writes in proptest::collection::vec((0u16..4096, 0u16..4096), 1..8),
        ) {
            let mut store = SettingsStore::new();
            store.set(SettingKey::ImageWidth, SettingValue::U16(1)).unwrap();
            store.set(SettingKey::ImageHeight, SettingValue::U16(1)).unwrap();
            let before = store.remote_view();

            store.begin_batch().unwrap();
            for (w, h) in &writes {
                store.set(SettingKey::ImageWidth, SettingValue::U16(*w)).unwrap();
                prop_assert_eq!(&store.remote_view(), &before);
                store.set(SettingKey::ImageHeight, SettingValue::U16(*h)).unwrap();
                prop_assert_eq!(&store.remote_view(), &before);
            }
            store.end_batch().unwrap();

            let after = store.remote_view();
            let (w, h) = writes[writes.len() - 1];
            prop_assert_eq!(after.revision, before.revision + 1);
            prop_assert_eq!(after.values[&SettingKey::ImageWidth], SettingValue::U16(w));
            prop_assert_eq!(after.values[&SettingKey::ImageHeight], SettingValue::U16(h));
        }
    }
}
