use crate::face::toggles;
use crate::{FaceId, FaceSet};
use slotmap::SecondaryMap;

/// Arbitrates which signal faces may request or hold green among
/// mutually conflicting faces.
///
/// Non-conflicting faces are admitted in parallel; a face that has
/// waited out its waiting limit at the head of the queue cannot be
/// jumped by later arrivals.
#[derive(Default)]
pub(crate) struct Scheduler {
    /// Faces that want green but have not been granted eligibility yet,
    /// in arrival order.
    requesting: Vec<FaceId>,
    /// Faces currently granted green-eligibility.
    allowed: Vec<FaceId>,
    /// Faces allowed out-of-turn since the current head of `requesting`
    /// started waiting.
    had_its_chance: Vec<FaceId>,
    /// When each waiting face began waiting.
    wait_start: SecondaryMap<FaceId, f64>,
    /// Per-face maximum wait and the time it was recorded.
    max_wait: SecondaryMap<FaceId, (f64, f64)>,
}

impl Scheduler {
    /// The worst wait a face has experienced, and when it ended.
    pub fn max_wait(&self, face: FaceId) -> Option<(f64, f64)> {
        self.max_wait.get(face).copied()
    }

    /// Runs one arbitration pass. Returns true if any membership or
    /// toggle changed.
    pub fn step(&mut self, faces: &mut FaceSet, now: f64) -> bool {
        let mut activity = false;

        // Drop faces that no longer want green or clearance, releasing
        // any clearance they had requested from conflicting faces.
        let wants = |faces: &FaceSet, id: FaceId| {
            let face = &faces[id];
            face.toggle_is_true(toggles::REQUEST_GREEN)
                || face.toggle_is_true(toggles::REQUEST_CLEARANCE)
                || face.toggle_is_true(toggles::REQUEST_PARTIAL_CLEARANCE)
        };
        let mut dropped = vec![];
        for list in [&mut self.requesting, &mut self.allowed] {
            list.retain(|id| {
                let keep = wants(faces, *id);
                if !keep {
                    dropped.push(*id);
                }
                keep
            });
        }
        for id in dropped {
            self.wait_start.remove(id);
            release_clearance(faces, id);
            log::debug!("scheduler: {:?} withdrew", faces[id].name());
            activity = true;
        }

        // Admit newly requesting faces, stamping the time they began
        // waiting. Faces already flowing do not re-enter the queue.
        let ids: Vec<FaceId> = faces.keys().collect();
        for id in &ids {
            let face = &faces[*id];
            if face.toggle_is_true(toggles::REQUEST_GREEN)
                && !face.toggle_is_true(toggles::TRAFFIC_FLOWING)
                && !self.requesting.contains(id)
                && !self.allowed.contains(id)
            {
                self.requesting.push(*id);
                if self.wait_start.get(*id).is_none() {
                    self.wait_start.insert(*id, now);
                }
                activity = true;
            }
        }

        // Seat a new head when nothing is allowed.
        if self.allowed.is_empty() && !self.requesting.is_empty() {
            let head = self.requesting.remove(0);
            self.allowed.push(head);
            self.had_its_chance.clear();
            activity = true;
        }

        // Keep admitting the head while it competes with nothing allowed.
        while let Some(&head) = self.requesting.first() {
            if self.conflicts_with_allowed(faces, head) {
                break;
            }
            self.requesting.remove(0);
            self.allowed.push(head);
            activity = true;
        }

        // Fairness override: while the head is within its waiting
        // limit, other compatible faces may be allowed out of turn,
        // once each. A head past its limit cannot be jumped.
        if let Some(&head) = self.requesting.first() {
            let waited = now - self.wait_start.get(head).copied().unwrap_or(now);
            if waited < faces[head].waiting_limit() {
                for id in self.requesting[1..].to_vec() {
                    if !self.had_its_chance.contains(&id)
                        && !self.conflicts_with_allowed(faces, id)
                    {
                        self.requesting.retain(|f| *f != id);
                        self.allowed.push(id);
                        self.had_its_chance.push(id);
                        activity = true;
                    }
                }
            }
        }

        // Release faces whose traffic is actually flowing, closing
        // their wait-time statistic.
        let flowing: Vec<FaceId> = self
            .allowed
            .iter()
            .copied()
            .filter(|id| faces[*id].toggle_is_true(toggles::TRAFFIC_FLOWING))
            .collect();
        for id in flowing {
            self.allowed.retain(|f| *f != id);
            if let Some(started) = self.wait_start.remove(id) {
                let wait = now - started;
                let best = self.max_wait.get(id).map(|(w, _)| *w).unwrap_or(f64::MIN);
                if wait > best {
                    self.max_wait.insert(id, (wait, now));
                }
                log::info!(
                    "scheduler: {:?} flowing after waiting {wait:.1}s",
                    faces[id].name()
                );
            }
            faces[id].clearance_requested_by.clear();
            activity = true;
        }

        // Grant eligibility to exactly the allowed set.
        for id in &ids {
            let granted = self.allowed.contains(id);
            if let Some(changed) = faces[*id].set_toggle(toggles::GREEN_REQUEST_GRANTED, granted) {
                activity |= changed;
            }
        }

        activity
    }

    fn conflicts_with_allowed(&self, faces: &FaceSet, id: FaceId) -> bool {
        self.allowed.iter().any(|a| faces[id].conflicts_with(*a))
    }
}

/// Removes `id` from every face's `clearance requested by` set,
/// clearing the `Clearance Requested` toggle of faces no longer
/// asked to clear by anyone.
fn release_clearance(faces: &mut FaceSet, id: FaceId) {
    let targets: Vec<FaceId> = faces.keys().collect();
    for target in targets {
        let face = &mut faces[target];
        let before = face.clearance_requested_by.len();
        face.clearance_requested_by.retain(|f| *f != id);
        if before > 0 && face.clearance_requested_by.is_empty() {
            face.set_toggle(toggles::CLEARANCE_REQUESTED, false);
        }
    }
}
