// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Collision lifecycle correlation
//!
//! Each tracked pair moves through `none -> enter -> stay* -> exit -> none`.
//! Enter and exit come from the solver's discrete begin/end events; stay is
//! derived from the step's contact list, once per pair however many contact
//! points it has, and never on the step the pair entered. Overlapping for K
//! consecutive steps therefore yields one enter, K-1 stays and one exit.

use crate::ecs::{CollisionPhase, EntityId, EntityPair};
use std::collections::BTreeSet;

/// One notification produced by a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionNotice {
    /// Lifecycle phase
    pub phase: CollisionPhase,
    /// The two entities involved
    pub pair: EntityPair,
}

/// Per-pair collision state across steps
#[derive(Debug, Default)]
pub struct ContactTracker {
    active: BTreeSet<EntityPair>,
}

impl ContactTracker {
    /// Create a tracker with no active pairs
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pairs currently in contact
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no pair is in contact
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Whether `pair` is currently in contact
    pub fn is_active(&self, pair: EntityPair) -> bool {
        self.active.contains(&pair)
    }

    /// Pairs currently in contact, ordered
    pub fn active_pairs(&self) -> impl Iterator<Item = EntityPair> + '_ {
        self.active.iter().copied()
    }

    /// Correlate one step.
    ///
    /// `begun` and `ended` are the step's discrete events, `current` the
    /// pairs found in its contact list (duplicates allowed). Notices are
    /// returned enters first, then stays, then exits. A pair seen in the
    /// contact list without a preceding begin is entered rather than stayed.
    pub fn correlate<B, E, C>(&mut self, begun: B, ended: E, current: C) -> Vec<CollisionNotice>
    where
        B: IntoIterator<Item = EntityPair>,
        E: IntoIterator<Item = EntityPair>,
        C: IntoIterator<Item = EntityPair>,
    {
        let mut enters = Vec::new();
        let mut entered_now = BTreeSet::new();
        for pair in begun {
            if pair.first() == pair.second() {
                continue;
            }
            if self.active.insert(pair) {
                entered_now.insert(pair);
                enters.push(CollisionNotice {
                    phase: CollisionPhase::Enter,
                    pair,
                });
            }
        }

        let ended: BTreeSet<EntityPair> = ended.into_iter().collect();
        let touching: BTreeSet<EntityPair> = current
            .into_iter()
            .filter(|p| p.first() != p.second() && !ended.contains(p))
            .collect();

        let mut stays = Vec::new();
        for pair in touching {
            if entered_now.contains(&pair) {
                continue;
            }
            if self.active.insert(pair) {
                enters.push(CollisionNotice {
                    phase: CollisionPhase::Enter,
                    pair,
                });
            } else {
                stays.push(CollisionNotice {
                    phase: CollisionPhase::Stay,
                    pair,
                });
            }
        }

        let mut exits = Vec::new();
        for pair in ended {
            if self.active.remove(&pair) {
                exits.push(CollisionNotice {
                    phase: CollisionPhase::Exit,
                    pair,
                });
            }
        }

        enters.extend(stays);
        enters.extend(exits);
        enters
    }

    /// Drop every active pair involving `entity`, returning them
    pub fn forget(&mut self, entity: EntityId) -> Vec<EntityPair> {
        let gone: Vec<EntityPair> = self
            .active
            .iter()
            .filter(|p| p.other(entity).is_some())
            .copied()
            .collect();
        for pair in &gone {
            self.active.remove(pair);
        }
        gone
    }

    /// Drop all state
    pub fn clear(&mut self) {
        self.active.clear();
    }
}
