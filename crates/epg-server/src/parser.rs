//! XMLTV-style guide document parser.
//!
//! Only the parts the index needs are decoded: `<channel id>` with its `<display-name lang>`
//! children, and `<programme start stop channel>` with its `<title>`. Every other element is
//! skipped, so upstream schema additions do not break ingestion. Structural problems (wrong
//! root, mismatched or unterminated tags, invalid UTF-8, bad escapes) are errors.
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::attributes::Attributes;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::AppError;
use crate::model::{Channel, DisplayName, GuideDocument, Programme};

const ROOT: &[u8] = b"tv";

/// Where the reader currently is, as far as the decoder cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Root,
    Channel,
    DisplayName,
    Programme,
    Title,
    Skipped,
}

pub fn parse_document_file(path: &Path) -> Result<GuideDocument, AppError> {
    let file = File::open(path)?;
    parse_document(BufReader::new(file))
}

pub fn parse_document<R: BufRead>(input: R) -> Result<GuideDocument, AppError> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(false);

    let mut decoder = Decoder::default();
    let mut buf = Vec::new();
    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| doc_error(&reader, e.to_string()))?;
        let step = match event {
            Event::Start(e) => decoder.open(&e),
            Event::Empty(e) => decoder.open(&e).and_then(|_| decoder.close()),
            Event::End(_) => decoder.close(),
            Event::Text(t) => t
                .unescape()
                .map_err(|e| e.to_string())
                .and_then(|text| decoder.text(&text)),
            Event::CData(c) => std::str::from_utf8(&c)
                .map_err(|e| e.to_string())
                .and_then(|text| decoder.text(text)),
            Event::Eof => {
                return Err(doc_error(
                    &reader,
                    match decoder.stack.last() {
                        None => "missing root element".to_string(),
                        Some(_) => "unexpected end of document".to_string(),
                    },
                ));
            }
            _ => Ok(()),
        };
        step.map_err(|message| doc_error(&reader, message))?;

        if decoder.finished {
            return Ok(decoder.doc);
        }
        buf.clear();
    }
}

fn doc_error<R>(reader: &Reader<R>, message: String) -> AppError {
    AppError::Document {
        position: reader.buffer_position() as u64,
        message,
    }
}

#[derive(Default)]
struct Decoder {
    doc: GuideDocument,
    stack: Vec<Frame>,
    channel: Option<Channel>,
    display_name: Option<DisplayName>,
    programme: Option<Programme>,
    title: Option<String>,
    finished: bool,
}

impl Decoder {
    fn open(&mut self, e: &BytesStart<'_>) -> Result<(), String> {
        let name = e.local_name();
        let parent = self.stack.last().copied();
        let frame = match (parent, name.as_ref()) {
            (None, ROOT) => {
                self.read_root_attributes(e.attributes())?;
                Frame::Root
            }
            (None, other) => {
                return Err(format!(
                    "expected root element <tv>, found <{}>",
                    String::from_utf8_lossy(other)
                ));
            }
            (Some(Frame::Root), b"channel") => {
                self.channel = Some(Channel {
                    id: attribute(e.attributes(), b"id")?.unwrap_or_default(),
                    display_names: Vec::new(),
                });
                Frame::Channel
            }
            (Some(Frame::Channel), b"display-name") => {
                self.display_name = Some(DisplayName {
                    lang: attribute(e.attributes(), b"lang")?.unwrap_or_default(),
                    value: String::new(),
                });
                Frame::DisplayName
            }
            (Some(Frame::Root), b"programme") => {
                let mut programme = Programme::default();
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| e.to_string())?;
                    let slot = match attr.key.local_name().as_ref() {
                        b"start" => &mut programme.start,
                        b"stop" => &mut programme.stop,
                        b"channel" => &mut programme.channel,
                        _ => continue,
                    };
                    *slot = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
                }
                self.programme = Some(programme);
                Frame::Programme
            }
            (Some(Frame::Programme), b"title") => {
                self.title = Some(String::new());
                Frame::Title
            }
            _ => Frame::Skipped,
        };
        self.stack.push(frame);
        Ok(())
    }

    fn close(&mut self) -> Result<(), String> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| "unexpected closing tag".to_string())?;
        match frame {
            Frame::Root => self.finished = true,
            Frame::Channel => {
                if let Some(channel) = self.channel.take() {
                    self.doc.channels.push(channel);
                }
            }
            Frame::DisplayName => {
                if let (Some(name), Some(channel)) = (self.display_name.take(), self.channel.as_mut()) {
                    channel.display_names.push(name);
                }
            }
            Frame::Programme => {
                if let Some(programme) = self.programme.take() {
                    self.doc.programmes.push(programme);
                }
            }
            Frame::Title => {
                // Repeated titles: the last one wins.
                if let (Some(title), Some(programme)) = (self.title.take(), self.programme.as_mut()) {
                    programme.title = title;
                }
            }
            Frame::Skipped => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), String> {
        match self.stack.last() {
            None if !text.trim().is_empty() => {
                return Err("text content before root element".to_string());
            }
            Some(Frame::DisplayName) => {
                if let Some(name) = self.display_name.as_mut() {
                    name.value.push_str(text);
                }
            }
            Some(Frame::Title) => {
                if let Some(title) = self.title.as_mut() {
                    title.push_str(text);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn read_root_attributes(&mut self, attrs: Attributes<'_>) -> Result<(), String> {
        for attr in attrs {
            let attr = attr.map_err(|e| e.to_string())?;
            let slot = match attr.key.local_name().as_ref() {
                b"generator-info-name" => &mut self.doc.generator_info_name,
                b"generator-info-url" => &mut self.doc.generator_info_url,
                b"source-info-name" => &mut self.doc.source_info_name,
                b"source-info-url" => &mut self.doc.source_info_url,
                _ => continue,
            };
            *slot = Some(attr.unescape_value().map_err(|e| e.to_string())?.into_owned());
        }
        Ok(())
    }
}

fn attribute(attrs: Attributes<'_>, key: &[u8]) -> Result<Option<String>, String> {
    for attr in attrs {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.local_name().as_ref() == key {
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
