/*!
 * media_profiles.xml Parser
 *
 * Extracts `VideoEncoderCap` limits for a single codec from the platform media
 * profiles descriptor.
 */

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::error::ProbeError;

const ROOT_ELEMENT: &[u8] = b"MediaSettings";
const ENCODER_ELEMENT: &[u8] = b"VideoEncoderCap";

/// One `VideoEncoderCap` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCap {
    pub name: String,
    pub max_frame_width: u32,
    pub max_frame_height: u32,
    pub max_bit_rate: u32,
}

/// Returns the single encoder entry named `codec_name`.
///
/// Zero or several matching entries are an error: the descriptor is only
/// trusted when it is unambiguous.
pub fn find_encoder_cap(xml: &str, codec_name: &str) -> Result<EncoderCap, ProbeError> {
    let mut caps = parse_encoder_caps(xml, codec_name)?;
    match caps.len() {
        1 => Ok(caps.remove(0)),
        0 => Err(ProbeError::NoMatch {
            codec: codec_name.to_string(),
        }),
        count => Err(ProbeError::Ambiguous {
            codec: codec_name.to_string(),
            count,
        }),
    }
}

/// Collects every `MediaSettings/VideoEncoderCap` entry whose `name` is `codec_name`.
pub fn parse_encoder_caps(xml: &str, codec_name: &str) -> Result<Vec<EncoderCap>, ProbeError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut caps = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                visit_element(&e, depth, codec_name, &mut caps)?;
                saw_root = true;
                depth += 1;
            }
            Ok(Event::Empty(e)) => {
                visit_element(&e, depth, codec_name, &mut caps)?;
                saw_root = true;
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProbeError::Malformed {
                    reason: format!("XML parse error at {}: {}", reader.buffer_position(), e),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(ProbeError::Malformed {
            reason: "descriptor has no root element".to_string(),
        });
    }
    if depth != 0 {
        return Err(ProbeError::Malformed {
            reason: format!("{} element(s) left unclosed", depth),
        });
    }

    debug!("Found {} {} encoder entries", caps.len(), codec_name);
    Ok(caps)
}

fn visit_element(
    e: &BytesStart<'_>,
    depth: usize,
    codec_name: &str,
    caps: &mut Vec<EncoderCap>,
) -> Result<(), ProbeError> {
    let name = e.name();
    if depth == 0 {
        if name.as_ref() != ROOT_ELEMENT {
            return Err(ProbeError::UnexpectedRoot {
                found: String::from_utf8_lossy(name.as_ref()).into_owned(),
            });
        }
        return Ok(());
    }

    if depth != 1 || name.as_ref() != ENCODER_ELEMENT {
        return Ok(());
    }
    if attribute(e, "name")?.as_deref() != Some(codec_name) {
        return Ok(());
    }

    caps.push(EncoderCap {
        name: codec_name.to_string(),
        max_frame_width: numeric_attribute(e, "maxFrameWidth")?,
        max_frame_height: numeric_attribute(e, "maxFrameHeight")?,
        max_bit_rate: numeric_attribute(e, "maxBitRate")?,
    });
    Ok(())
}

fn attribute(e: &BytesStart<'_>, key: &'static str) -> Result<Option<String>, ProbeError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ProbeError::Malformed {
            reason: format!("bad attribute: {}", err),
        })?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr.unescape_value().map_err(|err| ProbeError::Malformed {
                reason: format!("bad {} value: {}", key, err),
            })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn numeric_attribute(e: &BytesStart<'_>, key: &'static str) -> Result<u32, ProbeError> {
    let value = attribute(e, key)?.ok_or(ProbeError::MissingAttribute { attribute: key })?;
    value
        .parse::<u32>()
        .map_err(|_| ProbeError::InvalidAttribute {
            attribute: key,
            value,
        })
}
