use log::warn;

use crate::{
    data::Dataset,
    error::{FmError, Result},
};

/// Data-derived facts about the attribute space that regularization depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaInfo {
    attr_group: Vec<usize>,
    num_attr_per_group: Vec<usize>,
    num_relations: usize,
}

impl MetaInfo {
    /// Creates a `MetaInfo` with every attribute in a single group.
    ///
    /// # Arguments
    /// * `num_attribute` - The width of the attribute space.
    pub fn new(num_attribute: usize) -> Self {
        Self {
            attr_group: vec![0; num_attribute],
            num_attr_per_group: vec![num_attribute],
            num_relations: 0,
        }
    }

    /// Creates a `MetaInfo` from an explicit attribute-group assignment.
    ///
    /// Attributes past the end of `groups` fall into group 0, entries past `num_attribute`
    /// are ignored. Group ids are dense: the group count is the largest id plus one.
    ///
    /// # Returns
    /// An error if `groups` is empty or names a group id of `num_attribute` or more.
    pub fn with_groups(num_attribute: usize, groups: &[usize]) -> Result<Self> {
        if groups.is_empty() {
            return Err(FmError::AttributeGroups(
                "the group assignment is empty".into(),
            ));
        }

        let bound = num_attribute.max(1);
        if let Some(&group) = groups.iter().find(|&&g| g >= bound) {
            return Err(FmError::AttributeGroups(format!(
                "group id {group} is out of range for {num_attribute} attributes"
            )));
        }

        if groups.len() < num_attribute {
            warn!(
                "attribute groups cover {} of {num_attribute} attributes, the rest go to group 0",
                groups.len()
            );
        }

        let attr_group: Vec<usize> = (0..num_attribute)
            .map(|j| groups.get(j).copied().unwrap_or(0))
            .collect();

        let num_groups = groups.iter().copied().max().unwrap_or(0) + 1;
        let mut num_attr_per_group = vec![0; num_groups];
        for &g in &attr_group {
            num_attr_per_group[g] += 1;
        }

        Ok(Self {
            attr_group,
            num_attr_per_group,
            num_relations: 0,
        })
    }

    /// Builds the `MetaInfo` for a training run from the resolved attribute count and the
    /// grouping and relations carried by the train set.
    pub fn from_dataset(num_attribute: usize, train: &Dataset) -> Result<Self> {
        let mut meta = match train.attribute_groups() {
            Some(groups) => Self::with_groups(num_attribute, groups)?,
            None => Self::new(num_attribute),
        };

        meta.num_relations = train.relation_count();
        Ok(meta)
    }

    pub fn num_attribute(&self) -> usize {
        self.attr_group.len()
    }

    pub fn num_attribute_groups(&self) -> usize {
        self.num_attr_per_group.len()
    }

    pub fn num_relations(&self) -> usize {
        self.num_relations
    }

    /// Returns the group of attribute `attribute`.
    pub fn group_of(&self, attribute: usize) -> usize {
        self.attr_group.get(attribute).copied().unwrap_or(0)
    }

    /// Iterates over the attributes belonging to `group`.
    pub fn members(&self, group: usize) -> impl Iterator<Item = usize> + '_ {
        self.attr_group
            .iter()
            .enumerate()
            .filter(move |&(_, &g)| g == group)
            .map(|(j, _)| j)
    }
}
