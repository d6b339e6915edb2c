//! Wrapper marking peer-supplied data as not yet validated.

use crate::error::Result;
use std::fmt;

/// A payload received from a counterparty, not yet checked.
///
/// The sender may be malicious or buggy, so the only way to get at the value
/// is [`UntrustworthyData::unwrap`], which demands a validation closure. No
/// bare accessor exists.
pub struct UntrustworthyData<T>(T);

impl<T> UntrustworthyData<T> {
    /// Wrap a freshly received payload
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Validate and extract the payload.
    ///
    /// The closure must inspect the value and either return it (possibly
    /// transformed) or fail; there is no path to the data that skips it.
    pub fn unwrap<U>(self, validate: impl FnOnce(T) -> Result<U>) -> Result<U> {
        validate(self.0)
    }
}

impl<T> From<T> for UntrustworthyData<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> fmt::Debug for UntrustworthyData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UntrustworthyData(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccordError;

    #[test]
    fn unwrap_runs_the_validator() {
        let data = UntrustworthyData::new(41);
        let value = data.unwrap(|n| Ok(n + 1)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn validator_failure_propagates() {
        let data = UntrustworthyData::new("junk");
        let out: Result<&str> = data.unwrap(|_| Err(AccordError::invalid("rejected")));
        assert!(out.is_err());
    }
}
