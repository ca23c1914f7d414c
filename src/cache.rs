//! Read cache for query results, invalidated by writes.

use crate::error::AppResult;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Users,
    Quarters,
    Levels,
    Classrooms,
    Students,
    Teachers,
    Attendance {
        classroom_id: String,
        class_date: String,
        quarter_id: String,
    },
    Grading {
        student_id: String,
        classroom_id: String,
        quarter_id: String,
    },
}

impl CacheKey {
    fn touches_classroom(&self, id: &str) -> bool {
        match self {
            CacheKey::Attendance { classroom_id, .. } | CacheKey::Grading { classroom_id, .. } => {
                classroom_id == id
            }
            _ => false,
        }
    }

    fn touches_quarter(&self, id: &str) -> bool {
        match self {
            CacheKey::Attendance { quarter_id, .. } | CacheKey::Grading { quarter_id, .. } => {
                quarter_id == id
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<CacheKey, serde_json::Value>,
    hits: u64,
    misses: u64,
}

impl QueryCache {
    /// Returns the cached value or runs `fetch`; failed fetches are not stored.
    pub fn get_or_fetch<F>(&mut self, key: CacheKey, fetch: F) -> AppResult<serde_json::Value>
    where
        F: FnOnce() -> AppResult<serde_json::Value>,
    {
        if let Some(v) = self.entries.get(&key) {
            self.hits += 1;
            log::debug!("cache hit: {:?}", key);
            return Ok(v.clone());
        }
        self.misses += 1;
        let value = fetch()?;
        self.entries.insert(key, value.clone());
        Ok(value)
    }

    #[cfg(test)]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn invalidate(&mut self, key: &CacheKey) {
        if self.entries.remove(key).is_some() {
            log::debug!("cache invalidated: {:?}", key);
        }
    }

    /// Drops attendance and grading reads scoped to a classroom.
    pub fn invalidate_classroom(&mut self, classroom_id: &str) {
        self.entries.retain(|k, _| !k.touches_classroom(classroom_id));
    }

    pub fn invalidate_quarter(&mut self, quarter_id: &str) {
        self.entries.retain(|k, _| !k.touches_quarter(quarter_id));
    }

    /// Drops every attendance and grading read.
    pub fn invalidate_records(&mut self) {
        self.entries
            .retain(|k, _| !matches!(k, CacheKey::Attendance { .. } | CacheKey::Grading { .. }));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;

    fn attendance_key(classroom: &str, date: &str) -> CacheKey {
        CacheKey::Attendance {
            classroom_id: classroom.into(),
            class_date: date.into(),
            quarter_id: "q1".into(),
        }
    }

    #[test]
    fn second_read_is_served_from_cache() {
        let mut cache = QueryCache::default();
        let mut calls = 0;
        for _ in 0..2 {
            let v = cache
                .get_or_fetch(CacheKey::Quarters, || {
                    calls += 1;
                    Ok(json!([1, 2]))
                })
                .expect("fetch");
            assert_eq!(v, json!([1, 2]));
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn failed_fetch_is_not_cached() {
        let mut cache = QueryCache::default();
        let r = cache.get_or_fetch(CacheKey::Levels, || Err(AppError::not_found("x")));
        assert!(r.is_err());
        assert!(!cache.contains(&CacheKey::Levels));
    }

    #[test]
    fn invalidation_is_exact_for_attendance_keys() {
        let mut cache = QueryCache::default();
        let a = attendance_key("c1", "2024-01-01");
        let b = attendance_key("c1", "2024-01-03");
        cache.get_or_fetch(a.clone(), || Ok(json!(1))).expect("a");
        cache.get_or_fetch(b.clone(), || Ok(json!(2))).expect("b");
        cache.invalidate(&a);
        assert!(!cache.contains(&a));
        assert!(cache.contains(&b));
    }

    #[test]
    fn classroom_invalidation_spares_other_classrooms() {
        let mut cache = QueryCache::default();
        let a = attendance_key("c1", "2024-01-01");
        let b = attendance_key("c2", "2024-01-01");
        cache.get_or_fetch(a.clone(), || Ok(json!(1))).expect("a");
        cache.get_or_fetch(b.clone(), || Ok(json!(2))).expect("b");
        cache.get_or_fetch(CacheKey::Classrooms, || Ok(json!([]))).expect("list");
        cache.invalidate_classroom("c1");
        assert!(!cache.contains(&a));
        assert!(cache.contains(&b));
        assert!(cache.contains(&CacheKey::Classrooms));
    }
}
