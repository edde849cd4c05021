/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::fmt;

use crate::Error;

/// The Exchange Server version identifiers allowed in `RequestServerVersion`
/// headers.
///
/// Variants are declared in release order, so comparing two versions tells
/// whether a feature introduced in one is available in the other.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/requestserverversion#version-attribute-values>
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExchangeServerVersion {
    Exchange2007,
    Exchange2007_SP1,
    Exchange2010,
    Exchange2010_SP1,
    Exchange2010_SP2,
    Exchange2013,
    #[default]
    Exchange2013_SP1,
}

impl ExchangeServerVersion {
    /// The identifier of this version as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ExchangeServerVersion::Exchange2007 => "Exchange2007",
            ExchangeServerVersion::Exchange2007_SP1 => "Exchange2007_SP1",
            ExchangeServerVersion::Exchange2010 => "Exchange2010",
            ExchangeServerVersion::Exchange2010_SP1 => "Exchange2010_SP1",
            ExchangeServerVersion::Exchange2010_SP2 => "Exchange2010_SP2",
            ExchangeServerVersion::Exchange2013 => "Exchange2013",
            ExchangeServerVersion::Exchange2013_SP1 => "Exchange2013_SP1",
        }
    }
}

/// Parses the provided string into a known version identifier.
impl TryFrom<&str> for ExchangeServerVersion {
    /// If the provided string could not be turned into a known version
    /// identifier, [`Error::UnknownServerVersion`] is returned.
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Exchange2007" => Ok(ExchangeServerVersion::Exchange2007),
            "Exchange2007_SP1" => Ok(ExchangeServerVersion::Exchange2007_SP1),
            "Exchange2010" => Ok(ExchangeServerVersion::Exchange2010),
            "Exchange2010_SP1" => Ok(ExchangeServerVersion::Exchange2010_SP1),
            "Exchange2010_SP2" => Ok(ExchangeServerVersion::Exchange2010_SP2),
            "Exchange2013" => Ok(ExchangeServerVersion::Exchange2013),
            "Exchange2013_SP1" => Ok(ExchangeServerVersion::Exchange2013_SP1),

            _ => Err(Error::UnknownServerVersion(value.to_owned())),
        }
    }
}

impl From<ExchangeServerVersion> for String {
    fn from(value: ExchangeServerVersion) -> Self {
        value.as_str().into()
    }
}

impl fmt::Display for ExchangeServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings of the service on whose behalf properties are serialized.
///
/// The legacy JSON paths and the update serializers consult this to decide
/// which properties may be sent to the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServiceContext {
    /// The schema version targeted by requests built with this context.
    pub requested_server_version: ExchangeServerVersion,
}

impl ServiceContext {
    pub fn new(requested_server_version: ExchangeServerVersion) -> Self {
        Self {
            requested_server_version,
        }
    }

    /// Whether a feature introduced in `version` can be used with the
    /// requested server version.
    pub fn supports(&self, version: ExchangeServerVersion) -> bool {
        self.requested_server_version >= version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_and_unknown_versions() {
        let version = ExchangeServerVersion::try_from("Exchange2010_SP2")
            .expect("known version should parse");
        assert_eq!(version, ExchangeServerVersion::Exchange2010_SP2);
        assert_eq!(String::from(version), "Exchange2010_SP2");

        let err = ExchangeServerVersion::try_from("Exchange2031")
            .expect_err("unknown version should not parse");
        assert!(
            matches!(err, Error::UnknownServerVersion(ref value) if value == "Exchange2031"),
            "error should carry the unknown value, got {err:?}"
        );
    }

    #[test]
    fn context_compares_versions_in_release_order() {
        let ctx = ServiceContext::new(ExchangeServerVersion::Exchange2010);

        assert!(ctx.supports(ExchangeServerVersion::Exchange2007_SP1));
        assert!(ctx.supports(ExchangeServerVersion::Exchange2010));
        assert!(
            !ctx.supports(ExchangeServerVersion::Exchange2013),
            "a later version should not be supported"
        );
    }
}
