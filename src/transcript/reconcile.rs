use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::{identity_of, signature_of, Transcript, TranscriptEntry};

/// Merge a freshly polled transcript into the previously rendered one.
///
/// Ordering always follows `incoming`. Entries whose identity and signature
/// are unchanged keep the previous `Arc`, and when nothing changed at all the
/// previous transcript itself is returned so callers can skip work with
/// `Arc::ptr_eq`.
pub fn reconcile(previous: &Transcript, incoming: &[TranscriptEntry]) -> Transcript {
    if incoming.is_empty() {
        return Arc::new(Vec::new());
    }
    if previous.is_empty() {
        return Arc::new(incoming.iter().cloned().map(Arc::new).collect());
    }

    // Entries may share an identity (same second-resolution createdAt), so
    // each identity maps to its previous entries in order.
    let mut index: HashMap<String, VecDeque<(&Arc<TranscriptEntry>, String)>> = HashMap::new();
    for entry in previous.iter() {
        index
            .entry(identity_of(entry))
            .or_default()
            .push_back((entry, signature_of(entry)));
    }

    let mut changed = false;
    let merged: Vec<Arc<TranscriptEntry>> = incoming
        .iter()
        .map(|entry| {
            let prior = index
                .get_mut(&identity_of(entry))
                .and_then(VecDeque::pop_front);
            match prior {
                Some((prior, prior_signature)) if prior_signature == signature_of(entry) => {
                    Arc::clone(prior)
                }
                _ => {
                    changed = true;
                    Arc::new(entry.clone())
                }
            }
        })
        .collect();

    if merged.len() != previous.len() {
        changed = true;
    }

    if changed {
        Arc::new(merged)
    } else {
        Arc::clone(previous)
    }
}
