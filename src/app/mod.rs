pub mod content_api;
pub mod page_cache;
pub mod prefetch;
pub mod queue;
pub mod resolver;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;
