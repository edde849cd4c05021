/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::{
    xml::{EwsXmlReader, EwsXmlWriter, XmlNamespace, MESSAGES_NS_URI, TYPES_NS_URI},
    Result, WireCodec,
};

/// Wraps `body` in a `t:` element declaring the EWS namespaces.
pub fn types_document(root_tag_name: &str, body: &str) -> String {
    format!(
        r#"<t:{root_tag_name} xmlns:m="{MESSAGES_NS_URI}" xmlns:t="{TYPES_NS_URI}">{body}</t:{root_tag_name}>"#
    )
}

/// Creates a reader positioned on the `t:` root element of `xml`.
pub fn reader_on_root<'a>(xml: &'a str, root_tag_name: &str) -> EwsXmlReader<'a> {
    let mut reader = EwsXmlReader::new(xml);
    reader
        .read_start_element(XmlNamespace::Types, root_tag_name)
        .unwrap();

    reader
}

/// Runs `write` against a writer declaring the EWS namespaces on its root
/// element, and returns the output.
pub fn write_to_string<F>(write: F) -> String
where
    F: FnOnce(&mut EwsXmlWriter<Vec<u8>>) -> Result<()>,
{
    collect(EwsXmlWriter::with_namespace_declarations(Vec::new()), write)
}

/// Runs `write` against a writer producing a bare fragment, and returns the
/// output.
pub fn write_fragment<F>(write: F) -> String
where
    F: FnOnce(&mut EwsXmlWriter<Vec<u8>>) -> Result<()>,
{
    collect(EwsXmlWriter::new(Vec::new()), write)
}

/// Assert the expected result of XML serialization.
pub fn assert_serialized_content<P: WireCodec>(
    data: &P,
    root_tag_name: &str,
    expected_xml_content: &str,
) {
    let actual_xml_content = write_fragment(|writer| data.write_to_xml(writer, root_tag_name));

    assert_eq!(actual_xml_content, expected_xml_content);
}

fn collect<F>(mut writer: EwsXmlWriter<Vec<u8>>, write: F) -> String
where
    F: FnOnce(&mut EwsXmlWriter<Vec<u8>>) -> Result<()>,
{
    write(&mut writer).unwrap();

    let buf = writer.into_inner().unwrap();
    String::from_utf8(buf).unwrap()
}
