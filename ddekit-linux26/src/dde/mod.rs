/// Page cache hooks and initialization
pub(crate) mod cache_ops;

pub(crate) mod imp;
