use chrono::{DateTime, Utc};

use crate::domain::estimate::{Estimate, EstimateId, EstimatePatch, EstimateStatus};
use crate::errors::DomainError;

pub const DEFAULT_ESTIMATES_CAP: usize = 1000;
const COPY_SUFFIX: &str = " (копия)";

/// The saved-estimate list, newest first and capped.
#[derive(Clone, Debug)]
pub struct EstimateBook {
    estimates: Vec<Estimate>,
    cap: usize,
}

impl Default for EstimateBook {
    fn default() -> Self {
        Self::new(DEFAULT_ESTIMATES_CAP)
    }
}

impl EstimateBook {
    pub fn new(cap: usize) -> Self {
        Self { estimates: Vec::new(), cap: cap.max(1) }
    }

    pub fn with_estimates(estimates: Vec<Estimate>, cap: usize) -> Self {
        let mut book = Self::new(cap);
        book.replace_all(estimates);
        book
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn all(&self) -> &[Estimate] {
        &self.estimates
    }

    pub fn len(&self) -> usize {
        self.estimates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimates.is_empty()
    }

    pub fn get(&self, id: &EstimateId) -> Option<&Estimate> {
        self.estimates.iter().find(|estimate| &estimate.id == id)
    }

    /// Validates and inserts at the front; the oldest entry falls off at the cap.
    pub fn save(&mut self, estimate: Estimate) -> Result<&Estimate, DomainError> {
        estimate.validate()?;
        self.estimates.retain(|existing| existing.id != estimate.id);
        self.estimates.insert(0, estimate);
        self.estimates.truncate(self.cap);
        Ok(&self.estimates[0])
    }

    /// Applies the patch and returns `(before, after)`.
    pub fn update(
        &mut self,
        id: &EstimateId,
        patch: EstimatePatch,
        now: DateTime<Utc>,
    ) -> Result<(Estimate, Estimate), DomainError> {
        let position = self.position(id)?;
        let before = self.estimates[position].clone();
        let mut after = before.clone();
        after.apply_patch(patch, now);
        after.validate()?;
        self.estimates[position] = after.clone();
        Ok((before, after))
    }

    pub fn delete(&mut self, id: &EstimateId) -> Result<Estimate, DomainError> {
        let position = self.position(id)?;
        Ok(self.estimates.remove(position))
    }

    /// Copies an estimate under a fresh id as a new draft.
    pub fn duplicate(
        &mut self,
        id: &EstimateId,
        author: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<&Estimate, DomainError> {
        let original = self.get(id).ok_or_else(|| DomainError::EstimateNotFound(id.0.clone()))?;
        let copy = Estimate {
            id: EstimateId::generate(),
            name: format!("{}{COPY_SUFFIX}", original.name),
            created_at: now,
            updated_at: now,
            author,
            status: EstimateStatus::Draft,
            ..original.clone()
        };
        self.save(copy)
    }

    pub fn replace_all(&mut self, mut estimates: Vec<Estimate>) {
        estimates.truncate(self.cap);
        self.estimates = estimates;
    }

    fn position(&self, id: &EstimateId) -> Result<usize, DomainError> {
        self.estimates
            .iter()
            .position(|estimate| &estimate.id == id)
            .ok_or_else(|| DomainError::EstimateNotFound(id.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::estimate::{
        Estimate, EstimateId, EstimatePatch, EstimateStatus, ValidationError,
    };
    use crate::domain::selection::Selection;
    use crate::errors::DomainError;

    use super::EstimateBook;

    fn estimate(name: &str, total: i64) -> Estimate {
        Estimate::new(name, Selection::default(), Vec::new(), Decimal::new(total, 0), None, Utc::now())
    }

    #[test]
    fn save_inserts_newest_first_and_caps() {
        let mut book = EstimateBook::new(2);
        book.save(estimate("A", 1)).expect("save A");
        book.save(estimate("B", 2)).expect("save B");
        book.save(estimate("C", 3)).expect("save C");

        let names: Vec<&str> = book.all().iter().map(|estimate| estimate.name.as_str()).collect();
        assert_eq!(names, vec!["C", "B"]);
    }

    #[test]
    fn invalid_estimate_is_rejected_without_touching_the_list() {
        let mut book = EstimateBook::default();
        let result = book.save(estimate("", 1));

        assert_eq!(result.err(), Some(DomainError::Validation(ValidationError::EmptyName)));
        assert!(book.is_empty());
    }

    #[test]
    fn update_returns_before_and_after() {
        let mut book = EstimateBook::default();
        let id = book.save(estimate("Дача", 100)).expect("save").id.clone();

        let (before, after) = book
            .update(
                &id,
                EstimatePatch { status: Some(EstimateStatus::InProgress), ..EstimatePatch::default() },
                Utc::now(),
            )
            .expect("update");

        assert_eq!(before.status, EstimateStatus::Draft);
        assert_eq!(after.status, EstimateStatus::InProgress);
        assert_eq!(book.get(&id).map(|estimate| estimate.status), Some(EstimateStatus::InProgress));

        let negative = EstimatePatch { total: Some(Decimal::new(-5, 0)), ..EstimatePatch::default() };
        assert!(book.update(&id, negative, Utc::now()).is_err());
        assert_eq!(book.get(&id).map(|estimate| estimate.total), Some(Decimal::new(100, 0)));
    }

    #[test]
    fn duplicate_gets_copy_suffix_and_new_id() {
        let mut book = EstimateBook::default();
        let id = book.save(estimate("Дача", 100)).expect("save").id.clone();

        let copy = book.duplicate(&id, Some("anna".to_string()), Utc::now()).expect("dup").clone();

        assert_ne!(copy.id, id);
        assert_eq!(copy.name, "Дача (копия)");
        assert_eq!(copy.status, EstimateStatus::Draft);
        assert_eq!(book.len(), 2);
        assert_eq!(book.all()[0].id, copy.id);
    }

    #[test]
    fn delete_missing_estimate_reports_not_found() {
        let mut book = EstimateBook::default();
        assert_eq!(
            book.delete(&EstimateId("nope".to_string())).err(),
            Some(DomainError::EstimateNotFound("nope".to_string()))
        );
    }
}
