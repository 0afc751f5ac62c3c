pub(crate) mod single_flight;
pub(crate) mod test_support;
