/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Definitions of the item properties built from the property types of this
//! crate.
//!
//! See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/fielduri>

pub mod item {
    use crate::{update::PropertyDefinition, ExchangeServerVersion};

    pub const ATTACHMENTS: PropertyDefinition = PropertyDefinition::new(
        "Attachments",
        "item:Attachments",
        ExchangeServerVersion::Exchange2007,
    );

    pub const EXTENDED_PROPERTY: PropertyDefinition = PropertyDefinition::new(
        "ExtendedProperty",
        "item:ExtendedProperty",
        ExchangeServerVersion::Exchange2007,
    );
}

pub mod message {
    use crate::{update::PropertyDefinition, ExchangeServerVersion};

    pub const TO_RECIPIENTS: PropertyDefinition = PropertyDefinition::new(
        "ToRecipients",
        "message:ToRecipients",
        ExchangeServerVersion::Exchange2007,
    );
}

pub mod contact {
    use crate::{update::PropertyDefinition, ExchangeServerVersion};

    pub const EMAIL_ADDRESSES: PropertyDefinition = PropertyDefinition::new(
        "EmailAddresses",
        "contacts:EmailAddresses",
        ExchangeServerVersion::Exchange2007,
    );

    pub const PHYSICAL_ADDRESSES: PropertyDefinition = PropertyDefinition::new(
        "PhysicalAddresses",
        "contacts:PhysicalAddresses",
        ExchangeServerVersion::Exchange2007,
    );
}
