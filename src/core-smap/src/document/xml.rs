use std::collections::BTreeMap;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::errors::Result;

pub const GENERATOR_COMMENT: &str = " Generated by smap (incremental sitemap builder) ";

/// Thin wrapper over a quick-xml writer that renders one sitemap document into memory.
pub struct DocumentWriter {
    writer: Writer<Vec<u8>>,
}

impl DocumentWriter {
    /// Starts a document with the XML declaration and the generator comment.
    pub fn new() -> Result<Self> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Comment(BytesText::from_escaped(GENERATOR_COMMENT)))?;
        Ok(DocumentWriter { writer })
    }

    pub fn start_with_attributes(&mut self, name: &str, attributes: &BTreeMap<String, String>) -> Result<()> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        self.writer.write_event(Event::Start(start))?;
        Ok(())
    }

    pub fn start(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::Start(BytesStart::new(name)))?;
        Ok(())
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// `<name>text</name>`, text escaped.
    pub fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(name)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// `<name a="b"/>`
    pub fn empty_element(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer.write_event(Event::Empty(element))?;
        Ok(())
    }

    pub fn finish(self) -> Result<String> {
        Ok(String::from_utf8(self.writer.into_inner())?)
    }
}
