use std::collections::BTreeMap;
use warden::ServiceDefinition;

/// What a reload has to do to move from one declared set to the next.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
	/// Newly declared, sorted.
	pub to_start: Vec<String>,
	/// No longer declared, sorted.
	pub to_stop: Vec<String>,
}

impl Reconciliation {
	pub fn is_empty(&self) -> bool {
		self.to_start.is_empty() && self.to_stop.is_empty()
	}
}

/// Names present in both sets are left alone, even if their definition changed.
pub fn reconcile(
	old: &BTreeMap<String, ServiceDefinition>,
	new: &BTreeMap<String, ServiceDefinition>,
) -> Reconciliation {
	Reconciliation {
		to_start: new.keys().filter(|n| !old.contains_key(*n)).cloned().collect(),
		to_stop: old.keys().filter(|n| !new.contains_key(*n)).cloned().collect(),
	}
}
