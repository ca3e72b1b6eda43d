pub(crate) mod invocations;
pub(crate) mod ping;
