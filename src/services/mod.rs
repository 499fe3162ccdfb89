pub(crate) mod attempts;
pub(crate) mod selection;
