use crate::collection::{Collection, Document};
use crate::common::{loose_cmp, Value};
use crate::errors::{ErrorKind, LokiError, LokiResult};
use crate::query::{IntoQuery, Operator, Query};
use crate::resultset::{Resultset, TransformStep};
use std::cmp::Ordering;

impl Collection {
    /// Every document matching `query`, in position order.
    pub fn find<Q: IntoQuery>(&self, query: Q) -> LokiResult<Vec<Document>> {
        let query = query.into_query()?;
        let positions = self.find_positions(&query)?;
        Ok(positions.into_iter().map(|p| self.data[p].clone()).collect())
    }

    /// The first document matching `query`.
    pub fn find_one<Q: IntoQuery>(&self, query: Q) -> LokiResult<Option<&Document>> {
        let query = query.into_query()?;
        if query.is_all() {
            return Ok(self.data.first());
        }
        Ok(self.data.iter().find(|doc| query.matches(doc)))
    }

    pub fn count_where<Q: IntoQuery>(&self, query: Q) -> LokiResult<usize> {
        let query = query.into_query()?;
        Ok(self.find_positions(&query)?.len())
    }

    /// Positions of every document matching `query`, ascending.
    ///
    /// A clean binary index answers the first index friendly field
    /// predicate; the candidates are then checked against the full query.
    /// Without a usable index the data array is scanned.
    pub(crate) fn find_positions(&self, query: &Query) -> LokiResult<Vec<usize>> {
        if query.is_all() {
            return Ok((0..self.data.len()).collect());
        }

        if let Some(mut positions) = self.index_candidates(query)? {
            positions.retain(|p| self.data.get(*p).is_some_and(|doc| query.matches(doc)));
            positions.sort_unstable();
            positions.dedup();
            return Ok(positions);
        }

        Ok(self.scan_positions(query))
    }

    /// Linear scan, never touching an index.
    pub(crate) fn scan_positions(&self, query: &Query) -> Vec<usize> {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, doc)| query.matches(doc))
            .map(|(p, _)| p)
            .collect()
    }

    /// First field predicate with a clean index, searched through nested
    /// conjunctions.
    fn conjunct_candidate<'q>(&self, query: &'q Query) -> Option<(&'q str, &'q Operator)> {
        match query {
            Query::And(clauses) => clauses.iter().find_map(|clause| self.conjunct_candidate(clause)),
            _ => query
                .index_candidate()
                .filter(|(field, _)| self.has_clean_index(field)),
        }
    }

    fn index_candidates(&self, query: &Query) -> LokiResult<Option<Vec<usize>>> {
        let candidate = match query {
            Query::And(_) => self.conjunct_candidate(query),
            _ => query.index_candidate(),
        };
        let Some((field, op)) = candidate else {
            return Ok(None);
        };
        let Some(index) = self.binary_indices.get(field) else {
            return Ok(None);
        };
        if index.is_dirty() {
            log::debug!("Index on '{}' is {:?}, scanning '{}'", field, index.state(), self.name);
            return Ok(None);
        }
        let Some(bounds) = op.index_bounds() else {
            return Ok(None);
        };

        let mut positions = Vec::new();
        for bound in bounds {
            let range = index.calculate_range(bound, &self.data)?;
            positions.extend_from_slice(index.positions(range));
        }
        Ok(Some(positions))
    }

    fn has_clean_index(&self, field: &str) -> bool {
        self.binary_indices
            .get(field)
            .is_some_and(|index| !index.is_dirty())
    }

    /// Starts a resultset over the whole collection.
    pub fn chain(&self) -> Resultset<&Collection> {
        Resultset::new(self)
    }

    /// Starts a resultset whose terminal `update`/`remove` write back here.
    pub fn chain_mut(&mut self) -> Resultset<&mut Collection> {
        Resultset::new(self)
    }

    /// Starts a resultset and runs the named transform on it.
    pub fn chain_transform(&self, name: &str, params: &Document) -> LokiResult<Resultset<&Collection>> {
        let steps = self.require_transform(name)?;
        Resultset::new(self).transform(steps, params)
    }

    /// Values of `field` for every document, `null` where it is missing.
    pub fn extract(&self, field: &str) -> Vec<Value> {
        self.data.iter().map(|doc| doc.resolve(field).clone()).collect()
    }

    /// Numeric values of `field`, skipping documents where it is not a
    /// number or numeric string.
    pub fn extract_numerical(&self, field: &str) -> Vec<f64> {
        self.data
            .iter()
            .filter_map(|doc| doc.get(field).and_then(Value::to_number))
            .collect()
    }

    pub fn max(&self, field: &str) -> Option<f64> {
        self.extract_numerical(field).into_iter().reduce(f64::max)
    }

    pub fn min(&self, field: &str) -> Option<f64> {
        self.extract_numerical(field).into_iter().reduce(f64::min)
    }

    pub fn avg(&self, field: &str) -> Option<f64> {
        let values = self.extract_numerical(field);
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Population standard deviation of the numeric values of `field`.
    pub fn std_dev(&self, field: &str) -> Option<f64> {
        let values = self.extract_numerical(field);
        let avg = self.avg(field)?;
        let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
        Some(variance.sqrt())
    }

    pub fn median(&self, field: &str) -> Option<f64> {
        let mut values = self.extract_numerical(field);
        if values.is_empty() {
            return None;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            Some((values[mid - 1] + values[mid]) / 2.0)
        } else {
            Some(values[mid])
        }
    }

    /// Id and value of the document holding the greatest `field` under the
    /// loose ordering. Documents without the field are skipped; the first
    /// of several equal maxima wins.
    pub fn max_record(&self, field: &str) -> Option<(i64, Value)> {
        self.extreme_record(field, Ordering::Greater)
    }

    pub fn min_record(&self, field: &str) -> Option<(i64, Value)> {
        self.extreme_record(field, Ordering::Less)
    }

    fn extreme_record(&self, field: &str, wanted: Ordering) -> Option<(i64, Value)> {
        let mut best: Option<(&Document, &Value)> = None;
        for doc in &self.data {
            let Some(value) = doc.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            match best {
                Some((_, current)) if loose_cmp(value, current) != wanted => {}
                _ => best = Some((doc, value)),
            }
        }
        best.and_then(|(doc, value)| doc.id().map(|id| (id, value.clone())))
    }

    /// Stores a named transform. Fails if the name is taken.
    pub fn add_transform(&mut self, name: &str, steps: Vec<TransformStep>) -> LokiResult<()> {
        if self.transforms.contains_key(name) {
            log::error!("Transform '{}' already exists in '{}'", name, self.name);
            return Err(LokiError::new(
                &format!("Transform '{}' already exists in collection '{}'", name, self.name),
                ErrorKind::TransformAlreadyExists,
            ));
        }
        self.transforms.insert(name.to_string(), steps);
        Ok(())
    }

    /// Stores a named transform, replacing any previous one.
    pub fn set_transform(&mut self, name: &str, steps: Vec<TransformStep>) {
        self.transforms.insert(name.to_string(), steps);
    }

    pub fn remove_transform(&mut self, name: &str) -> bool {
        self.transforms.shift_remove(name).is_some()
    }

    pub fn get_transform(&self, name: &str) -> Option<&[TransformStep]> {
        self.transforms.get(name).map(Vec::as_slice)
    }

    pub(crate) fn require_transform(&self, name: &str) -> LokiResult<&[TransformStep]> {
        self.get_transform(name).ok_or_else(|| {
            log::error!("Transform '{}' not found in '{}'", name, self.name);
            LokiError::new(
                &format!("Transform '{}' not found in collection '{}'", name, self.name),
                ErrorKind::TransformNotFound,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::collection::CollectionOptions;
    use crate::common::Value;
    use crate::doc;
    use crate::errors::ErrorKind;
    use crate::query::{field, Query};
    use crate::resultset::TransformStep;
    use crate::Collection;

    fn weapons(indexed: bool) -> Collection {
        let options = if indexed {
            CollectionOptions::new().index("name").index("weight")
        } else {
            CollectionOptions::new()
        };
        let mut weapons = Collection::new("weapons", options);
        weapons
            .insert(vec![
                doc! { name: "mjolnir", owner: "thor", weight: 42 },
                doc! { name: "gungnir", owner: "odin", weight: 7 },
                doc! { name: "tyrfing", owner: "Svafrlami", weight: 3 },
                doc! { name: "draupnir", owner: "odin", weight: "9" },
            ])
            .unwrap();
        weapons
    }

    fn ids(docs: &[crate::collection::Document]) -> Vec<i64> {
        docs.iter().filter_map(|d| d.id()).collect()
    }

    #[test]
    fn test_find_with_and_without_index() {
        let indexed = weapons(true);
        let plain = weapons(false);
        let queries = vec![
            doc! { owner: "odin" },
            doc! { weight: { "$gt": 5 } },
            doc! { weight: { "$aeq": 9 } },
            doc! { weight: 9 },
            doc! { name: { "$in": ["tyrfing", "gungnir", "nothing"] } },
            doc! { name: "nonexistent" },
            doc! { weight: { "$between": [4, 10] }, owner: "odin" },
        ];
        for query in queries {
            assert_eq!(
                ids(&indexed.find(&query).unwrap()),
                ids(&plain.find(&query).unwrap()),
                "query {}",
                query
            );
        }
        assert_eq!(ids(&indexed.find(doc! { weight: { "$aeq": 9 } }).unwrap()), vec![4]);
        assert!(indexed.find(doc! { name: "nonexistent" }).unwrap().is_empty());
    }

    #[test]
    fn test_range_inside_nested_and_uses_index() {
        let collection = weapons(true);
        let query = Query::parse(&doc! { weight: { "$gt": 1, "$lt": 9 }, owner: "odin" }).unwrap();
        assert!(matches!(query, Query::And(ref clauses) if clauses.iter().any(|c| matches!(c, Query::And(_)))));

        let candidate = collection.conjunct_candidate(&query).map(|(field, _)| field);
        assert_eq!(candidate, Some("weight"));
        assert!(collection.index_candidates(&query).unwrap().is_some());
        assert_eq!(collection.find_positions(&query).unwrap(), vec![1]);
        assert_eq!(collection.scan_positions(&query), vec![1]);
    }

    #[test]
    fn test_find_positions_agree_with_scan() {
        let collection = weapons(true);
        let query = Query::parse(&doc! { weight: { "$lte": 9 } }).unwrap();
        assert_eq!(
            collection.find_positions(&query).unwrap(),
            collection.scan_positions(&query)
        );
    }

    #[test]
    fn test_find_one_and_count() {
        let collection = weapons(true);
        let odin = collection.find_one(doc! { owner: "odin" }).unwrap().unwrap();
        assert_eq!(odin.id(), Some(2));
        assert_eq!(collection.count_where(field("owner").eq("odin")).unwrap(), 2);
        assert!(collection.find(doc! { owner: { "$bogus": 1 } }).is_err());
    }

    #[test]
    fn test_aggregates() {
        let collection = weapons(false);
        assert_eq!(collection.max("weight"), Some(42.0));
        assert_eq!(collection.min("weight"), Some(3.0));
        assert_eq!(collection.avg("weight"), Some(15.25));
        assert_eq!(collection.median("weight"), Some(8.0));
        assert_eq!(collection.max_record("weight"), Some((1, Value::from(42))));
        assert_eq!(collection.min_record("weight"), Some((3, Value::from(3))));
        assert_eq!(collection.extract("owner").len(), 4);
        assert!(collection.max("missing").is_none());
    }

    #[test]
    fn test_transforms_are_named() {
        let mut collection = weapons(false);
        let steps = vec![
            TransformStep::Find(doc! { owner: "[%lktxp]owner" }),
            TransformStep::Limit(Value::from(1)),
        ];
        collection.add_transform("by_owner", steps.clone()).unwrap();
        assert_eq!(
            collection.add_transform("by_owner", steps).unwrap_err().kind(),
            &ErrorKind::TransformAlreadyExists
        );
        let result = collection
            .chain_transform("by_owner", &doc! { owner: "odin" })
            .unwrap()
            .data(Default::default());
        assert_eq!(ids(&result), vec![2]);
        assert!(collection.remove_transform("by_owner"));
        assert_eq!(
            collection.chain_transform("by_owner", &doc! {}).unwrap_err().kind(),
            &ErrorKind::TransformNotFound
        );
    }
}
