use crate::face::toggles;
use crate::{FaceId, FaceSet};

/// Runs the clearance protocol: propagates "please turn red" requests
/// across conflict sets and recomputes the derived all-clear toggles.
///
/// Returns true if any toggle or membership changed.
pub(crate) fn step(faces: &mut FaceSet) -> bool {
    let ids: Vec<FaceId> = faces.keys().collect();
    let mut activity = false;

    // Requests that have been withdrawn no longer hold their targets.
    for id in &ids {
        let stale: Vec<FaceId> = faces[*id]
            .clearance_requested_by
            .iter()
            .copied()
            .filter(|r| {
                !faces[*r].toggle_is_true(toggles::REQUEST_CLEARANCE)
                    && !faces[*r].toggle_is_true(toggles::REQUEST_PARTIAL_CLEARANCE)
            })
            .collect();
        if stale.is_empty() {
            continue;
        }
        let face = &mut faces[*id];
        face.clearance_requested_by.retain(|r| !stale.contains(r));
        activity = true;
        if face.clearance_requested_by.is_empty() {
            if face.set_toggle(toggles::CLEARANCE_REQUESTED, false) == Some(true) {
                activity = true;
            }
        }
    }

    // Propagate full clearance requests across the full conflict set,
    // then partial requests across the partial conflict set.
    for (request, partial) in [
        (toggles::REQUEST_CLEARANCE, false),
        (toggles::REQUEST_PARTIAL_CLEARANCE, true),
    ] {
        for id in &ids {
            if !faces[*id].toggle_is_true(request) {
                continue;
            }
            let targets = if partial {
                faces[*id].partial_conflicts.clone()
            } else {
                faces[*id].conflicts.clone()
            };
            for target in targets {
                if faces[target].toggle_is_true(toggles::CLEARED) {
                    continue;
                }
                let face = &mut faces[target];
                if face.set_toggle(toggles::CLEARANCE_REQUESTED, true) == Some(true) {
                    activity = true;
                }
                if !face.clearance_requested_by.contains(id) {
                    face.clearance_requested_by.push(*id);
                    activity = true;
                }
            }
        }
    }

    // Recompute the derived all-clear toggles from scratch.
    for id in &ids {
        let face = &faces[*id];
        let requesting_full = face.toggle_is_true(toggles::REQUEST_CLEARANCE);
        let requesting_partial = face.toggle_is_true(toggles::REQUEST_PARTIAL_CLEARANCE);
        let all_cleared = |set: &[FaceId], faces: &FaceSet| {
            set.iter().all(|f| faces[*f].toggle_is_true(toggles::CLEARED))
        };
        let full_clear =
            (requesting_full || requesting_partial) && all_cleared(&face.conflicts, faces);
        let partial_clear = requesting_partial && all_cleared(&face.partial_conflicts, faces);

        let face = &mut faces[*id];
        if face.set_toggle(toggles::CONFLICTING_PATHS_CLEAR, full_clear) == Some(true) {
            activity = true;
        }
        if face.set_toggle(toggles::PARTIAL_CONFLICTING_PATHS_CLEAR, partial_clear) == Some(true) {
            activity = true;
        }
    }

    activity
}
