use std::marker::PhantomData;

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// K8s-style condition entry. The serialized field names are part of the
/// status contract consumed by external watchers and must stay stable.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct Condition<T> {
    #[serde(rename = "type")]
    pub type_: T,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        rename = "lastTransitionTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<String>,
}

/// Wiring between a resource's dependent readiness signals and the condition
/// type enum they serialize as. `ORDERED` fixes the evaluation order: the
/// aggregate's reason/message always comes from the first blocking entry in
/// this order, so repeated passes over the same inputs produce identical
/// aggregates.
///
/// Mark operations take the dependent enum rather than the condition type,
/// which makes marking a non-dependent type (including the aggregate itself)
/// unrepresentable.
pub trait Dependents: Copy + Eq + 'static {
    type Kind: Copy + Eq;

    /// Dependent conditions in evaluation order.
    const ORDERED: &'static [Self];
    /// The derived aggregate condition type. Never marked directly.
    const READY: Self::Kind;

    fn kind(self) -> Self::Kind;
}

/// Mutable view over a status's condition vector. All writes go through the
/// mark operations; the aggregate is recomputed after every mark so it can
/// never be stale relative to its inputs.
pub struct ConditionSet<'a, D: Dependents> {
    conditions: &'a mut Vec<Condition<D::Kind>>,
    _dependents: PhantomData<D>,
}

impl<'a, D: Dependents> ConditionSet<'a, D> {
    pub fn new(conditions: &'a mut Vec<Condition<D::Kind>>) -> Self {
        Self {
            conditions,
            _dependents: PhantomData,
        }
    }

    /// Seed Unknown entries for the aggregate and every dependent. Entries
    /// already present are left untouched, so re-initializing a status loaded
    /// from persisted state is a no-op.
    pub fn init(&mut self) {
        let now = Utc::now().to_rfc3339();
        for d in D::ORDERED {
            if self.find(d.kind()).is_none() {
                self.conditions.push(Condition {
                    type_: d.kind(),
                    status: ConditionStatus::Unknown,
                    reason: None,
                    message: None,
                    last_transition_time: Some(now.clone()),
                });
            }
        }
        if self.find(D::READY).is_none() {
            self.conditions.push(Condition {
                type_: D::READY,
                status: ConditionStatus::Unknown,
                reason: None,
                message: None,
                last_transition_time: Some(now),
            });
        }
        self.sort();
        self.recompute();
    }

    pub fn mark_ready(&mut self, dep: D) {
        self.set(dep.kind(), ConditionStatus::True, None, None);
        self.recompute();
    }

    pub fn mark_not_ready(&mut self, dep: D, reason: &str, message: &str) {
        self.set(
            dep.kind(),
            ConditionStatus::False,
            Some(reason.to_string()),
            Some(message.to_string()),
        );
        self.recompute();
    }

    pub fn mark_unknown(&mut self, dep: D, reason: &str, message: &str) {
        self.set(
            dep.kind(),
            ConditionStatus::Unknown,
            Some(reason.to_string()),
            Some(message.to_string()),
        );
        self.recompute();
    }

    pub fn is_ready(&self) -> bool {
        self.find(D::READY)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }

    pub fn aggregate(&self) -> Option<&Condition<D::Kind>> {
        self.find(D::READY)
    }

    fn find(&self, kind: D::Kind) -> Option<&Condition<D::Kind>> {
        self.conditions.iter().find(|c| c.type_ == kind)
    }

    /// Upsert one entry. `lastTransitionTime` advances only when the status
    /// actually changes; reason/message updates alone leave it untouched.
    fn set(
        &mut self,
        kind: D::Kind,
        status: ConditionStatus,
        reason: Option<String>,
        message: Option<String>,
    ) {
        match self.conditions.iter_mut().find(|c| c.type_ == kind) {
            Some(existing) => {
                if existing.status != status {
                    existing.last_transition_time =
                        Some(Utc::now().to_rfc3339());
                }
                existing.status = status;
                existing.reason = reason;
                existing.message = message;
            }
            None => {
                self.conditions.push(Condition {
                    type_: kind,
                    status,
                    reason,
                    message,
                    last_transition_time: Some(Utc::now().to_rfc3339()),
                });
                self.sort();
            }
        }
    }

    /// Derive the aggregate: True iff every dependent is True; False (with
    /// the first False dependent's reason/message) beats Unknown; a missing
    /// dependent entry counts as Unknown.
    fn recompute(&mut self) {
        let mut first_false: Option<(Option<String>, Option<String>)> = None;
        let mut first_unknown: Option<(Option<String>, Option<String>)> = None;
        for d in D::ORDERED {
            match self.find(d.kind()) {
                Some(c) if c.status == ConditionStatus::True => {}
                Some(c) if c.status == ConditionStatus::False => {
                    if first_false.is_none() {
                        first_false =
                            Some((c.reason.clone(), c.message.clone()));
                    }
                }
                Some(c) => {
                    if first_unknown.is_none() {
                        first_unknown =
                            Some((c.reason.clone(), c.message.clone()));
                    }
                }
                None => {
                    if first_unknown.is_none() {
                        first_unknown = Some((None, None));
                    }
                }
            }
        }
        let (status, reason, message) = match (first_false, first_unknown) {
            (Some((r, m)), _) => (ConditionStatus::False, r, m),
            (None, Some((r, m))) => (ConditionStatus::Unknown, r, m),
            (None, None) => (ConditionStatus::True, None, None),
        };
        self.set(D::READY, status, reason, message);
    }

    /// Stable layout to reduce patch churn: aggregate first, then dependents
    /// in declared order.
    fn sort(&mut self) {
        self.conditions.sort_by_key(|c| Self::rank(c.type_));
    }

    fn rank(kind: D::Kind) -> usize {
        if kind == D::READY {
            return 0;
        }
        D::ORDERED
            .iter()
            .position(|d| d.kind() == kind)
            .map(|i| i + 1)
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Kind {
        Ready,
        AReady,
        BReady,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Dep {
        A,
        B,
    }

    impl Dependents for Dep {
        type Kind = Kind;
        const ORDERED: &'static [Self] = &[Dep::A, Dep::B];
        const READY: Kind = Kind::Ready;
        fn kind(self) -> Kind {
            match self {
                Dep::A => Kind::AReady,
                Dep::B => Kind::BReady,
            }
        }
    }

    fn aggregate(conds: &mut Vec<Condition<Kind>>) -> Condition<Kind> {
        ConditionSet::<Dep>::new(conds).aggregate().unwrap().clone()
    }

    #[test]
    fn init_seeds_unknown_and_is_idempotent() {
        let mut conds = Vec::new();
        ConditionSet::<Dep>::new(&mut conds).init();
        assert_eq!(conds.len(), 3);
        assert!(
            conds.iter().all(|c| c.status == ConditionStatus::Unknown),
            "all conditions start Unknown"
        );

        let mut set = ConditionSet::<Dep>::new(&mut conds);
        set.mark_ready(Dep::A);
        set.init();
        let a = conds.iter().find(|c| c.type_ == Kind::AReady).unwrap();
        assert_eq!(
            a.status,
            ConditionStatus::True,
            "re-init must not clobber existing entries"
        );
    }

    #[test]
    fn all_dependents_true_makes_aggregate_true() {
        let mut conds = Vec::new();
        let mut set = ConditionSet::<Dep>::new(&mut conds);
        set.init();
        set.mark_ready(Dep::A);
        assert!(!set.is_ready(), "one dependent still Unknown");
        set.mark_ready(Dep::B);
        assert!(set.is_ready());
    }

    #[test]
    fn first_false_dependent_supplies_aggregate_reason() {
        let mut conds = Vec::new();
        let mut set = ConditionSet::<Dep>::new(&mut conds);
        set.init();
        set.mark_not_ready(Dep::B, "BGone", "b failed");
        set.mark_not_ready(Dep::A, "AGone", "a failed");
        set.mark_ready(Dep::B);
        // A comes first in declared order even though B was marked later.
        set.mark_not_ready(Dep::B, "BGone", "b failed again");
        let agg = aggregate(&mut conds);
        assert_eq!(agg.status, ConditionStatus::False);
        assert_eq!(agg.reason.as_deref(), Some("AGone"));
        assert_eq!(agg.message.as_deref(), Some("a failed"));
    }

    #[test]
    fn false_beats_unknown() {
        let mut conds = Vec::new();
        let mut set = ConditionSet::<Dep>::new(&mut conds);
        set.init();
        set.mark_not_ready(Dep::B, "BGone", "b failed");
        let agg = aggregate(&mut conds);
        assert_eq!(agg.status, ConditionStatus::False);
        assert_eq!(agg.reason.as_deref(), Some("BGone"));
    }

    #[test]
    fn repeated_mark_does_not_advance_transition_time() {
        let mut conds = Vec::new();
        let mut set = ConditionSet::<Dep>::new(&mut conds);
        set.init();
        set.mark_ready(Dep::A);
        let first = conds
            .iter()
            .find(|c| c.type_ == Kind::AReady)
            .unwrap()
            .clone();
        ConditionSet::<Dep>::new(&mut conds).mark_ready(Dep::A);
        let second = conds.iter().find(|c| c.type_ == Kind::AReady).unwrap();
        assert_eq!(
            first.last_transition_time, second.last_transition_time,
            "no transition, no timestamp change"
        );
        assert_eq!(first.status, second.status);
    }

    #[test]
    fn flapping_dependent_flips_aggregate_both_ways() {
        let mut conds = Vec::new();
        let mut set = ConditionSet::<Dep>::new(&mut conds);
        set.init();
        set.mark_ready(Dep::A);
        set.mark_ready(Dep::B);
        assert!(set.is_ready());
        set.mark_not_ready(Dep::A, "AGone", "a failed");
        assert!(!set.is_ready());
        set.mark_ready(Dep::A);
        assert!(set.is_ready());
    }

    #[test]
    fn aggregate_sorts_first_for_stable_layout() {
        let mut conds = Vec::new();
        let mut set = ConditionSet::<Dep>::new(&mut conds);
        set.init();
        set.mark_ready(Dep::B);
        assert_eq!(conds[0].type_, Kind::Ready);
        assert_eq!(conds[1].type_, Kind::AReady);
        assert_eq!(conds[2].type_, Kind::BReady);
    }
}
