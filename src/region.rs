use std::{borrow::Cow, fmt, str::FromStr};

use aws_sdk_sts::config::Region as StsRegion;

use crate::Error;

/// The AWS region STS requests are sent to.
///
/// Without one, the region is resolved the way the AWS SDK does (environment, then profile).
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Region(StsRegion);

impl Region {
    /// A region with the given name, such as `eu-west-1`.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(StsRegion::new(name))
    }

    /// The region name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    pub(crate) fn to_sts(&self) -> StsRegion {
        self.0.clone()
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let name = name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::Config(format!("invalid region {name:?}")));
        }
        Ok(Self::new(name.to_ascii_lowercase()))
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Region").field(&self.as_str()).finish()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
