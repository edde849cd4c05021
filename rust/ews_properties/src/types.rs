/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Concrete properties built on the generic collection and dictionary types.

mod attachment;
mod email_address;
mod email_address_dictionary;
mod extended_property;
mod physical_address;

pub use attachment::*;
pub use email_address::*;
pub use email_address_dictionary::*;
pub use extended_property::*;
pub use physical_address::*;
