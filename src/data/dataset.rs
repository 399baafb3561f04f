use std::hash::{DefaultHasher, Hash, Hasher};

/// A single non-zero entry of a sparse case.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    pub id: usize,
    pub value: f64,
}

impl Feature {
    pub fn new(id: usize, value: f64) -> Self {
        Self { id, value }
    }
}

/// A regression dataset stored as compressed sparse rows.
///
/// Besides the cases themselves it carries the shape metadata the trainer needs to size
/// a model: the width of the attribute space, the target range and, optionally, how the
/// attributes are grouped for regularization.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    offsets: Vec<usize>,
    features: Vec<Feature>,
    targets: Vec<f64>,
    num_feature: usize,
    relation_count: usize,
    attribute_groups: Option<Vec<usize>>,
}

impl Dataset {
    /// Creates a dataset with no cases and no attributes.
    pub fn empty() -> Self {
        Self {
            offsets: vec![0],
            ..Default::default()
        }
    }

    /// Creates a dataset from `(target, features)` pairs.
    ///
    /// # Arguments
    /// * `cases` - The cases, each one a target and its non-zero `(id, value)` entries.
    pub fn from_cases<I, F>(cases: I) -> Self
    where
        I: IntoIterator<Item = (f64, F)>,
        F: IntoIterator<Item = (usize, f64)>,
    {
        let mut dataset = Self::empty();
        for (target, features) in cases {
            dataset.push_case(target, features);
        }

        dataset
    }

    /// Appends a case, widening the attribute space if needed.
    pub fn push_case<F>(&mut self, target: f64, features: F)
    where
        F: IntoIterator<Item = (usize, f64)>,
    {
        for (id, value) in features {
            self.num_feature = self.num_feature.max(id + 1);
            self.features.push(Feature::new(id, value));
        }

        self.offsets.push(self.features.len());
        self.targets.push(target);
    }

    /// Declares the attribute space to be at least `num_feature` wide, even if the highest
    /// attributes never appear in a case.
    pub fn with_num_feature(mut self, num_feature: usize) -> Self {
        self.num_feature = self.num_feature.max(num_feature);
        self
    }

    pub fn with_relation_count(mut self, relation_count: usize) -> Self {
        self.relation_count = relation_count;
        self
    }

    /// Attaches an attribute-group assignment, `groups[j]` being the group of attribute `j`.
    pub fn with_attribute_groups(mut self, groups: Vec<usize>) -> Self {
        self.attribute_groups = Some(groups);
        self
    }

    pub fn num_cases(&self) -> usize {
        self.targets.len()
    }

    pub fn num_feature(&self) -> usize {
        self.num_feature
    }

    pub fn relation_count(&self) -> usize {
        self.relation_count
    }

    pub fn attribute_groups(&self) -> Option<&[usize]> {
        self.attribute_groups.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn target(&self, case: usize) -> f64 {
        self.targets[case]
    }

    /// Returns the smallest target, or 0 for an empty dataset.
    pub fn min_target(&self) -> f64 {
        self.targets
            .iter()
            .copied()
            .reduce(f64::min)
            .unwrap_or_default()
    }

    /// Returns the largest target, or 0 for an empty dataset.
    pub fn max_target(&self) -> f64 {
        self.targets
            .iter()
            .copied()
            .reduce(f64::max)
            .unwrap_or_default()
    }

    /// Returns the non-zero entries of a case.
    ///
    /// # Panics
    /// If `case` is out of bounds.
    pub fn row(&self, case: usize) -> &[Feature] {
        &self.features[self.offsets[case]..self.offsets[case + 1]]
    }

    /// Iterates over `(row, target)` pairs in case order.
    pub fn cases(&self) -> impl Iterator<Item = (&[Feature], f64)> + '_ {
        (0..self.num_cases()).map(|i| (self.row(i), self.targets[i]))
    }

    /// Builds the attribute-major view of the data, one column per attribute in
    /// `0..width`, each holding the `(case, value)` entries of that attribute.
    ///
    /// Attributes at or beyond `width` are dropped.
    pub fn transpose(&self, width: usize) -> Vec<Vec<(usize, f64)>> {
        let mut columns = vec![Vec::new(); width];
        for case in 0..self.num_cases() {
            for feature in self.row(case) {
                if let Some(column) = columns.get_mut(feature.id) {
                    column.push((case, feature.value));
                }
            }
        }

        columns
    }

    /// Returns a hash of the cases and targets, used to recognise a dataset seen before.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.num_cases().hash(&mut hasher);
        self.offsets.hash(&mut hasher);
        for target in &self.targets {
            target.to_bits().hash(&mut hasher);
        }

        for feature in &self.features {
            feature.id.hash(&mut hasher);
            feature.value.to_bits().hash(&mut hasher);
        }

        hasher.finish()
    }
}
