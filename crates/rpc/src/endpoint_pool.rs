use std::collections::VecDeque;

use url::Url;

use crate::error::{Error, Result};

/// Ordered candidate endpoints for a single logical backend.
///
/// Construction takes the first endpoint as the active one, so a fresh pool
/// over `[A, B]` is active on `A` with `[B]` remaining. Rotation pops the next
/// remaining endpoint. A reset makes every original endpoint eligible again;
/// the endpoint that was active at the reset is skipped by the following
/// rotations, so each endpoint is used at most once per cycle.
#[derive(Clone, Debug)]
pub struct EndpointPool {
    active: Url,
    /// Endpoint the current cycle started on.
    anchor: Url,
    original: Vec<Url>,
    remaining: VecDeque<Url>,
}

impl EndpointPool {
    /// Creates a pool over `endpoints`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEndpoints`] if `endpoints` is empty.
    pub fn new(endpoints: impl IntoIterator<Item = Url>) -> Result<Self> {
        let original: Vec<Url> = endpoints.into_iter().collect();

        let mut remaining: VecDeque<Url> = original.iter().cloned().collect();
        let active = remaining.pop_front().ok_or(Error::NoEndpoints)?;

        Ok(Self {
            anchor: active.clone(),
            active,
            original,
            remaining,
        })
    }

    /// Parses and pools endpoint addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if any address is not a valid URL, or none are given.
    pub fn parse<I, S>(endpoints: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls = endpoints
            .into_iter()
            .map(|endpoint| {
                let endpoint = endpoint.as_ref();
                Url::parse(endpoint).map_err(|e| Error::InvalidEndpoint(endpoint.to_string(), e))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(urls)
    }

    /// The endpoint requests currently go to.
    #[must_use]
    pub const fn active(&self) -> &Url {
        &self.active
    }

    /// Endpoints as configured.
    #[must_use]
    pub fn original(&self) -> &[Url] {
        &self.original
    }

    /// Endpoints still eligible for rotation, in order.
    #[must_use]
    pub fn remaining(&self) -> Vec<Url> {
        self.remaining.iter().cloned().collect()
    }

    /// Makes the next remaining endpoint active.
    ///
    /// Returns `None`, leaving the active endpoint unchanged, once every
    /// remaining endpoint has been used.
    pub fn next(&mut self) -> Option<&Url> {
        loop {
            let candidate = self.remaining.pop_front()?;
            if candidate != self.anchor {
                self.active = candidate;
                return Some(&self.active);
            }
        }
    }

    /// Makes every original endpoint eligible again, keeping the active one.
    pub fn reset(&mut self) {
        self.anchor = self.active.clone();
        self.remaining = self.original.iter().cloned().collect();
    }

    /// Returns to the freshly constructed state: first endpoint active, the
    /// rest remaining.
    pub fn restart(&mut self) {
        self.remaining = self.original.iter().cloned().collect();
        if let Some(first) = self.remaining.pop_front() {
            self.active = first;
        }
        self.anchor = self.active.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(endpoints: &[&str]) -> EndpointPool {
        EndpointPool::parse(endpoints).unwrap()
    }

    #[test]
    fn test_first_endpoint_is_active() {
        let pool = pool(&["http://a.test", "http://b.test"]);

        assert_eq!(pool.active().as_str(), "http://a.test/");
        assert_eq!(pool.remaining(), vec![Url::parse("http://b.test").unwrap()]);
        assert_eq!(pool.original().len(), 2);
    }

    #[test]
    fn test_rotation_until_exhausted() {
        let mut pool = pool(&["http://a.test", "http://b.test", "http://c.test"]);

        assert_eq!(pool.next().unwrap().host_str(), Some("b.test"));
        assert_eq!(pool.next().unwrap().host_str(), Some("c.test"));
        assert!(pool.next().is_none());
        assert_eq!(pool.active().host_str(), Some("c.test"));
        assert!(pool.remaining().is_empty());
    }

    #[test]
    fn test_reset_restores_original() {
        let mut pool = pool(&["http://a.test", "http://b.test"]);
        pool.next();
        pool.reset();

        assert_eq!(pool.remaining(), pool.original());
    }

    #[test]
    fn test_rotation_after_reset_skips_active() {
        let mut pool = pool(&["http://a.test", "http://b.test", "http://c.test"]);
        pool.next();
        pool.reset();

        assert_eq!(pool.next().unwrap().host_str(), Some("a.test"));
        assert_eq!(pool.next().unwrap().host_str(), Some("c.test"));
        assert!(pool.next().is_none());
    }

    #[test]
    fn test_restart_returns_to_first_endpoint() {
        let mut pool = pool(&["http://a.test", "http://b.test", "http://c.test"]);
        pool.next();
        pool.next();
        assert!(pool.next().is_none());

        pool.restart();

        assert_eq!(pool.active().host_str(), Some("a.test"));
        assert_eq!(pool.remaining(), &pool.original()[1..]);
        assert_eq!(pool.next().unwrap().host_str(), Some("b.test"));
    }

    #[test]
    fn test_rejects_empty_and_invalid() {
        assert!(matches!(
            EndpointPool::new(Vec::new()),
            Err(Error::NoEndpoints)
        ));
        assert!(matches!(
            EndpointPool::parse(["not a url"]),
            Err(Error::InvalidEndpoint(..))
        ));
    }
}
