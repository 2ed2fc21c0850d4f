//! DBC file parser
//!
//! Parses Vector DBC files with the `can-dbc` crate and converts them into a
//! validated [`Catalog`]. Comments, attributes and value tables are attached
//! to the messages and signals they name; anything that names a message or
//! signal the file does not define is reported as a load issue.
//!
//! `can-dbc` stops at the first statement it does not understand, so lines
//! starting with a keyword this crate does not consume are blanked out before
//! parsing. Blanking keeps line numbers intact for error reporting.

use crate::signals::database::{
    AttributeValue, ByteOrder, Catalog, LoadIssue, MessageDefinition, Multiplexer,
    SignalDefinition, SignalKind, ValueType,
};
use crate::types::{canonical_id, DecoderError, ParseError, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Pseudo message some tools emit to hold signals that belong to no frame
const INDEPENDENT_SIGNALS_MSG: &str = "VECTOR__INDEPENDENT_SIG_MSG";

/// Keywords passed through to `can-dbc`; every other statement is dropped
const KNOWN_KEYWORDS: &[&str] = &[
    "VERSION",
    "NS_",
    "BS_",
    "BU_",
    "BO_",
    "SG_",
    "CM_",
    "BA_DEF_",
    "BA_DEF_DEF_",
    "BA_",
    "VAL_",
];

/// Parse a DBC file and return the catalog
pub fn parse_dbc_file(path: &Path) -> Result<Catalog> {
    log::info!("Parsing DBC file: {:?}", path);

    // Read the DBC file as bytes first (handle non-UTF8 encodings)
    let bytes = std::fs::read(path)?;

    // Try UTF-8 first, then fall back to Latin-1/Windows-1252
    let content = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("DBC file is not UTF-8, trying Latin-1 encoding");
            e.into_bytes().iter().map(|&b| b as char).collect()
        }
    };

    let catalog = parse_dbc(&content).map_err(|source| DecoderError::DbcParseError {
        path: path.to_path_buf(),
        source,
    })?;

    log::info!(
        "Parsed {} messages from {:?} ({} issues)",
        catalog.stats().num_messages,
        path,
        catalog.issues().len()
    );

    Ok(catalog)
}

/// Parse DBC source text into a catalog
pub fn parse_dbc(source: &str) -> std::result::Result<Catalog, ParseError> {
    let filtered = prefilter(source);

    // Parse using can-dbc crate
    let dbc = match can_dbc::DBC::from_slice(filtered.text.as_bytes()) {
        Ok(dbc) => dbc,
        Err(can_dbc::Error::Incomplete(dbc, rest)) if rest.trim().is_empty() => dbc,
        Err(e) => return Err(locate_error(&filtered.text, e)),
    };

    Ok(build_catalog(&dbc, &filtered.lines))
}

/// Source with unsupported statements blanked, plus where the statements
/// this crate resolves against messages start
struct Filtered {
    text: String,
    lines: HashMap<&'static str, Vec<usize>>,
}

fn prefilter(source: &str) -> Filtered {
    let mut text = String::with_capacity(source.len());
    let mut lines: HashMap<&'static str, Vec<usize>> = HashMap::new();
    let mut in_string = false;
    let mut dropping = false;

    for (idx, line) in source.lines().enumerate() {
        let continuation = in_string;
        in_string ^= line.matches('"').count() % 2 == 1;

        if continuation {
            if !dropping {
                text.push_str(line);
            }
            text.push('\n');
            continue;
        }

        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or("");
        // Indented single words are the symbol list of the NS_ block
        let indented = line.starts_with(char::is_whitespace);
        let is_symbol = indented && words.next().is_none();

        dropping = !keyword.is_empty() && !is_symbol && !is_known(keyword);
        if dropping {
            log::debug!("line {}: skipping unsupported keyword {}", idx + 1, keyword);
        } else {
            if !is_symbol {
                if let Some(known) = ["CM_", "BA_", "VAL_"].into_iter().find(|k| *k == keyword) {
                    lines.entry(known).or_default().push(idx + 1);
                }
            }
            text.push_str(line);
        }
        text.push('\n');
    }

    Filtered { text, lines }
}

/// `BU_:` and `BS_:` may be written with or without a space before the colon
fn is_known(keyword: &str) -> bool {
    KNOWN_KEYWORDS.contains(&keyword.trim_end_matches(':'))
}

/// Turn a `can-dbc` error into a line-numbered [`ParseError`]
fn locate_error(text: &str, err: can_dbc::Error<'_>) -> ParseError {
    let remaining = match &err {
        can_dbc::Error::Incomplete(_, remaining) => *remaining,
        can_dbc::Error::Nom(nom::Err::Error(e) | nom::Err::Failure(e)) => e.input,
        can_dbc::Error::Nom(nom::Err::Incomplete(_)) => "",
        #[allow(unreachable_patterns)]
        _ => return ParseError::new(1, format!("{:?}", err)),
    };

    let rest = remaining.trim_start();
    let offset = text.len() - rest.len();
    let line = text[..offset].matches('\n').count() + 1;

    let reason = match rest.lines().next() {
        Some(statement) => format!("unexpected input '{}'", statement.trim()),
        None => "unexpected end of input".to_string(),
    };
    ParseError::new(line, reason)
}

/// Object an attribute definition applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeScope {
    Network,
    Node,
    Message,
    Signal,
    EnvVar,
}

/// Declared attribute type, from the free text `can-dbc` keeps
#[derive(Debug, Clone, PartialEq)]
enum AttributeType {
    Int,
    Float,
    Str,
    Enum(Vec<String>),
    Unknown,
}

#[derive(Debug, Clone)]
struct AttributeDefinition {
    scope: AttributeScope,
    kind: AttributeType,
}

/// `"<name>" <type> [params]`
fn parse_attribute_definition(
    scope: AttributeScope,
    body: &str,
) -> Option<(String, AttributeDefinition)> {
    let body = body.trim().strip_prefix('"')?;
    let (name, rest) = body.split_once('"')?;
    let rest = rest.trim();
    let kind_word = rest.split_whitespace().next().unwrap_or("");

    let kind = match kind_word {
        "INT" | "HEX" => AttributeType::Int,
        "FLOAT" => AttributeType::Float,
        "STRING" => AttributeType::Str,
        "ENUM" => {
            let labels = rest[kind_word.len()..]
                .split('"')
                .skip(1)
                .step_by(2)
                .map(str::to_string)
                .collect();
            AttributeType::Enum(labels)
        }
        other => {
            log::warn!("attribute '{}' has unknown type {}", name, other);
            AttributeType::Unknown
        }
    };

    Some((name.to_string(), AttributeDefinition { scope, kind }))
}

/// Target of a `CM_`/`BA_`/`VAL_` statement, recorded with its source line
#[derive(Debug, Clone)]
struct Reference<T> {
    line: usize,
    keyword: &'static str,
    id: u32,
    signal: Option<String>,
    value: T,
}

struct Attributes {
    definitions: HashMap<String, AttributeDefinition>,
    defaults: HashMap<String, AttributeValue>,
}

impl Attributes {
    fn from_dbc(dbc: &can_dbc::DBC) -> Self {
        let definitions: HashMap<String, AttributeDefinition> = dbc
            .attribute_definitions()
            .iter()
            .filter_map(|def| {
                let (scope, body) = match def {
                    can_dbc::AttributeDefinition::Message(body) => (AttributeScope::Message, body),
                    can_dbc::AttributeDefinition::Signal(body) => (AttributeScope::Signal, body),
                    can_dbc::AttributeDefinition::Node(body) => (AttributeScope::Node, body),
                    can_dbc::AttributeDefinition::EnvironmentVariable(body) => {
                        (AttributeScope::EnvVar, body)
                    }
                    can_dbc::AttributeDefinition::Plain(body) => (AttributeScope::Network, body),
                };
                parse_attribute_definition(scope, body)
            })
            .collect();

        let mut attributes = Self {
            definitions,
            defaults: HashMap::new(),
        };
        for default in dbc.attribute_defaults() {
            let name = default.attribute_name();
            let value = attributes.convert(name, default.attribute_value());
            attributes.defaults.insert(name.clone(), value);
        }
        attributes
    }

    /// Convert a parsed value, honouring the declared type. Enum indices
    /// resolve to their label.
    fn convert(&self, name: &str, value: &can_dbc::AttributeValue) -> AttributeValue {
        let kind = self.definitions.get(name).map(|def| &def.kind);
        let integral = |v: f64| {
            v.fract() == 0.0 && matches!(kind, Some(AttributeType::Int | AttributeType::Enum(_)))
        };

        let value = match value {
            can_dbc::AttributeValue::AttributeValueU64(v) => AttributeValue::Int(*v as i64),
            can_dbc::AttributeValue::AttributeValueI64(v) => AttributeValue::Int(*v),
            can_dbc::AttributeValue::AttributeValueF64(v) if integral(*v) => {
                AttributeValue::Int(*v as i64)
            }
            can_dbc::AttributeValue::AttributeValueF64(v) => AttributeValue::Float(*v),
            can_dbc::AttributeValue::AttributeValueCharString(s) => AttributeValue::Str(s.clone()),
        };

        if let (Some(AttributeType::Enum(labels)), AttributeValue::Int(idx)) = (kind, &value) {
            if let Some(label) = usize::try_from(*idx).ok().and_then(|i| labels.get(i)) {
                return AttributeValue::Str(label.clone());
            }
        }
        value
    }

    fn defaults_for(&self, scope: AttributeScope) -> BTreeMap<String, AttributeValue> {
        self.definitions
            .iter()
            .filter(|(_, def)| def.scope == scope)
            .filter_map(|(name, _)| {
                self.defaults
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect()
    }
}

/// Convert the parsed file, attach comments, attributes and value tables,
/// then validate each message into the catalog.
fn build_catalog(dbc: &can_dbc::DBC, lines: &HashMap<&'static str, Vec<usize>>) -> Catalog {
    let mut catalog = Catalog::new();
    catalog.version = Some(dbc.version().0.clone()).filter(|v| !v.is_empty());
    catalog.nodes = dbc
        .nodes()
        .iter()
        .flat_map(|node| node.0.iter().cloned())
        .collect();

    let attributes = Attributes::from_dbc(dbc);
    let message_defaults = attributes.defaults_for(AttributeScope::Message);
    let signal_defaults = attributes.defaults_for(AttributeScope::Signal);

    let mut messages: Vec<MessageDefinition> = dbc
        .messages()
        .iter()
        .filter(|msg| {
            let independent = msg.message_name() == INDEPENDENT_SIGNALS_MSG;
            if independent {
                log::debug!("Skipping {}", INDEPENDENT_SIGNALS_MSG);
            }
            !independent
        })
        .map(|msg| {
            let mut message = convert_message(msg);
            message.attributes = message_defaults.clone();
            for signal in &mut message.signals {
                signal.attributes = signal_defaults.clone();
            }
            message
        })
        .collect();

    let line_of = |keyword: &str, index: usize| {
        lines
            .get(keyword)
            .and_then(|l| l.get(index))
            .copied()
            .unwrap_or(0)
    };
    let mut unmatched = Vec::new();

    for (index, comment) in dbc.comments().iter().enumerate() {
        let (id, signal, text) = match comment {
            can_dbc::Comment::Message {
                message_id,
                comment,
                ..
            } => (message_id.0, None, comment),
            can_dbc::Comment::Signal {
                message_id,
                signal_name,
                comment,
                ..
            } => (message_id.0, Some(signal_name.clone()), comment),
            _ => {
                log::trace!("Ignoring comment on other object");
                continue;
            }
        };
        let reference = Reference {
            line: line_of("CM_", index),
            keyword: "CM_",
            id,
            signal,
            value: text.clone(),
        };
        let matched = apply(&mut messages, &reference, |target, text| match target {
            Target::Signal(signal) => signal.comment = Some(text.clone()),
            Target::Message(message) => message.comment = Some(text.clone()),
        });
        if !matched {
            unmatched.push(unmatched_issue(&reference));
        }
    }

    for (index, assignment) in dbc.attribute_values().iter().enumerate() {
        let name = assignment.attribute_name();
        let (id, signal, value) = match assignment.attribute_value() {
            can_dbc::AttributeValuedForObjectType::MessageDefinitionAttributeValue(
                message_id,
                Some(value),
            ) => (message_id.0, None, value),
            can_dbc::AttributeValuedForObjectType::SignalAttributeValue(
                message_id,
                signal_name,
                value,
            ) => (message_id.0, Some(signal_name.clone()), value),
            _ => {
                log::trace!("Ignoring attribute '{}' on other object", name);
                continue;
            }
        };
        let reference = Reference {
            line: line_of("BA_", index),
            keyword: "BA_",
            id,
            signal,
            value: attributes.convert(name, value),
        };
        let matched = apply(&mut messages, &reference, |target, value| {
            let map = match target {
                Target::Signal(signal) => &mut signal.attributes,
                Target::Message(message) => &mut message.attributes,
            };
            map.insert(name.clone(), value.clone());
        });
        if !matched {
            unmatched.push(unmatched_issue(&reference));
        }
    }

    for (index, description) in dbc.value_descriptions().iter().enumerate() {
        let (id, signal, values) = match description {
            can_dbc::ValueDescription::Signal {
                message_id,
                signal_name,
                value_descriptions,
            } => (message_id.0, signal_name, value_descriptions),
            can_dbc::ValueDescription::EnvironmentVariable { .. } => {
                log::debug!("Skipping environment variable value table");
                continue;
            }
        };
        let table: BTreeMap<i64, String> = values
            .iter()
            .map(|v| (*v.a() as i64, v.b().clone()))
            .collect();
        let reference = Reference {
            line: line_of("VAL_", index),
            keyword: "VAL_",
            id,
            signal: Some(signal.clone()),
            value: table,
        };
        let matched = apply(&mut messages, &reference, |target, table| {
            if let Target::Signal(signal) = target {
                signal.value_table = Some(table.clone());
            }
        });
        if !matched {
            unmatched.push(unmatched_issue(&reference));
        }
    }

    for message in messages {
        catalog.add_message(message);
    }
    for issue in unmatched {
        catalog.report(issue);
    }

    catalog
}

/// Convert a can-dbc message to our MessageDefinition
fn convert_message(dbc_msg: &can_dbc::Message) -> MessageDefinition {
    let mut message = MessageDefinition::new(
        dbc_msg.message_id().0,
        dbc_msg.message_name().clone(),
        *dbc_msg.message_size() as usize,
    );
    message.sender = match dbc_msg.transmitter() {
        can_dbc::Transmitter::NodeName(name) => Some(name.clone()),
        _ => None,
    };
    message.signals = dbc_msg.signals().iter().map(convert_signal).collect();
    message
}

/// Convert a can-dbc signal to our SignalDefinition
fn convert_signal(dbc_sig: &can_dbc::Signal) -> SignalDefinition {
    // Determine byte order
    let byte_order = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    // Determine value type
    let value_type = match *dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    // Extended multiplexing (mNM) is flattened onto the message's switch
    let multiplexer = match *dbc_sig.multiplexer_indicator() {
        can_dbc::MultiplexIndicator::Multiplexor => Some(Multiplexer::Switch),
        can_dbc::MultiplexIndicator::MultiplexedSignal(value)
        | can_dbc::MultiplexIndicator::MultiplexorAndMultiplexedSignal(value) => {
            Some(Multiplexer::Multiplexed(value))
        }
        can_dbc::MultiplexIndicator::Plain => None,
    };

    // Out-of-range values saturate and are rejected by catalog validation
    let mut signal = SignalDefinition::new(
        dbc_sig.name().clone(),
        u16::try_from(*dbc_sig.start_bit()).unwrap_or(u16::MAX),
        u16::try_from(*dbc_sig.signal_size()).unwrap_or(u16::MAX),
        byte_order,
        value_type,
        SignalKind::physical(
            *dbc_sig.factor(),
            *dbc_sig.offset(),
            *dbc_sig.min(),
            *dbc_sig.max(),
        ),
    );
    signal.unit = Some(dbc_sig.unit().clone()).filter(|u| !u.is_empty());
    signal.receivers = dbc_sig
        .receivers()
        .iter()
        .filter(|r| r.as_str() != "Vector__XXX")
        .cloned()
        .collect();
    signal.multiplexer = multiplexer;
    signal
}

/// Object a reference resolved to
enum Target<'a> {
    Message(&'a mut MessageDefinition),
    Signal(&'a mut SignalDefinition),
}

/// Apply a reference to every parsed message with the same canonical id.
/// Returns false if no message (or no signal of that name) matched.
fn apply<T>(
    messages: &mut [MessageDefinition],
    reference: &Reference<T>,
    mut f: impl FnMut(Target<'_>, &T),
) -> bool {
    let id = canonical_id(reference.id);
    let mut matched = false;

    for message in messages.iter_mut().filter(|m| m.id == id) {
        let target = match &reference.signal {
            Some(name) => match message.signals.iter_mut().find(|s| &s.name == name) {
                Some(signal) => Target::Signal(signal),
                None => continue,
            },
            None => Target::Message(message),
        };
        f(target, &reference.value);
        matched = true;
    }

    matched
}

fn unmatched_issue<T>(reference: &Reference<T>) -> LoadIssue {
    let target = match &reference.signal {
        Some(signal) => format!(
            "signal '{}' of message {} (0x{:X})",
            signal,
            reference.id,
            canonical_id(reference.id)
        ),
        None => format!(
            "message {} (0x{:X})",
            reference.id,
            canonical_id(reference.id)
        ),
    };
    LoadIssue::UnmatchedReference {
        line: reference.line,
        keyword: reference.keyword.to_string(),
        target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Statements every DBC file starts with (five lines)
    const HEADER: &str = "VERSION \"\"\n\nNS_ :\n\nBS_:\n";

    fn with_header(body: &str) -> String {
        format!("{}BU_: MC AMS\n{}", HEADER, body)
    }

    const SAMPLE_DBC: &str = r#"
VERSION "1.2"

NS_ :
    NS_DESC_
    CM_
    BA_DEF_
    BA_
    VAL_
    BA_DEF_DEF_

BS_:

BU_: MC AMS

BO_ 2147492410 Temperatures: 8 MC
 SG_ ControllerTemp : 7|16@0- (0.1,0) [0|100] "C" Vector__XXX
 SG_ MotorTemp : 23|16@0- (0.1,0) [0|120] "C" Vector__XXX
 SG_ FAULT : 39|8@0+ (1,0) [0|255] "" Vector__XXX
 SG_ Reserved1 : 47|24@0+ (0,0) [0|0] "" Vector__XXX

BO_ 291 EngineData: 8 AMS
 SG_ EngineSpeed : 0|16@1+ (1,0) [0|8000] "rpm" MC,AMS

CM_ BO_ 2147492410 "Controller and motor temperatures
with the active fault code";
CM_ SG_ 2147492410 FAULT "Active fault";
BA_DEF_ BO_ "VFrameFormat" ENUM "StandardCAN","ExtendedCAN","reserved","J1939PG";
BA_DEF_ BO_ "GenMsgCycleTime" INT 0 65535;
BA_DEF_ "BusType" STRING ;
BA_DEF_DEF_ "VFrameFormat" "StandardCAN";
BA_DEF_DEF_ "GenMsgCycleTime" 100;
BA_DEF_DEF_ "BusType" "CAN";
BA_ "VFrameFormat" BO_ 2147492410 1;
BA_ "GenMsgCycleTime" BO_ 2147492410 50;
VAL_ 2147492410 FAULT 0 "No fault" 1 "Overvoltage" 2 "Undervoltage" ;
"#;

    #[test]
    fn test_parse_sample_catalog() {
        let catalog = parse_dbc(SAMPLE_DBC).unwrap();
        assert_eq!(catalog.stats().num_messages, 2);
        assert_eq!(catalog.nodes().to_vec(), vec!["MC".to_string(), "AMS".to_string()]);
        assert_eq!(catalog.version(), Some("1.2"));
        assert!(catalog.issues().is_empty(), "{:?}", catalog.issues());

        let msg = catalog.lookup(0x223A).unwrap();
        assert_eq!(msg.name, "Temperatures");
        assert_eq!(msg.raw_id, 2147492410);
        assert_eq!(msg.size, 8);
        assert_eq!(msg.sender.as_deref(), Some("MC"));
        assert_eq!(msg.signals.len(), 4);
        assert_eq!(
            msg.comment.as_deref(),
            Some("Controller and motor temperatures\nwith the active fault code")
        );

        let temp = msg.signal("ControllerTemp").unwrap();
        assert_eq!(temp.start_bit, 7);
        assert_eq!(temp.length, 16);
        assert_eq!(temp.byte_order, ByteOrder::BigEndian);
        assert_eq!(temp.value_type, ValueType::Signed);
        assert_eq!(temp.unit.as_deref(), Some("C"));
        assert!(temp.receivers.is_empty());
        assert!(matches!(temp.kind, SignalKind::Physical { scale, .. } if scale == 0.1));

        assert!(msg.signal("Reserved1").unwrap().is_reserved());

        let fault = msg.signal("FAULT").unwrap();
        assert_eq!(fault.comment.as_deref(), Some("Active fault"));
        assert_eq!(fault.describe(2), Some("Undervoltage"));
        assert_eq!(fault.describe(9), None);

        let engine = catalog.lookup(291).unwrap();
        let speed = engine.signal("EngineSpeed").unwrap();
        assert_eq!(speed.byte_order, ByteOrder::LittleEndian);
        assert_eq!(speed.receivers, vec!["MC".to_string(), "AMS".to_string()]);
    }

    #[test]
    fn test_attributes_merge_defaults_and_resolve_enums() {
        let catalog = parse_dbc(SAMPLE_DBC).unwrap();
        let temps = catalog.lookup(0x223A).unwrap();
        assert_eq!(
            temps.attributes.get("VFrameFormat"),
            Some(&AttributeValue::Str("ExtendedCAN".to_string()))
        );
        assert_eq!(
            temps.attributes.get("GenMsgCycleTime"),
            Some(&AttributeValue::Int(50))
        );

        let engine = catalog.lookup(291).unwrap();
        assert_eq!(
            engine.attributes.get("VFrameFormat"),
            Some(&AttributeValue::Str("StandardCAN".to_string()))
        );
        assert_eq!(
            engine.attributes.get("GenMsgCycleTime"),
            Some(&AttributeValue::Int(100))
        );
        // Network-scope attributes are not copied onto messages
        assert!(!engine.attributes.contains_key("BusType"));
    }

    #[test]
    fn test_attribute_definition_text() {
        let (name, def) = parse_attribute_definition(
            AttributeScope::Message,
            r#" "VFrameFormat" ENUM "StandardCAN","ExtendedCAN""#,
        )
        .unwrap();
        assert_eq!(name, "VFrameFormat");
        assert_eq!(
            def.kind,
            AttributeType::Enum(vec!["StandardCAN".to_string(), "ExtendedCAN".to_string()])
        );

        let (_, def) =
            parse_attribute_definition(AttributeScope::Node, r#""Weird" FANCYTYPE 1 2"#).unwrap();
        assert_eq!(def.kind, AttributeType::Unknown);
        assert!(parse_attribute_definition(AttributeScope::Network, "no quotes").is_none());
    }

    #[test]
    fn test_unknown_keywords_are_skipped() {
        let dbc = with_header(
            r#"
VAL_TABLE_ Switch 1 "On" 0 "Off" ;

BO_ 100 Status: 8 MC
 SG_ State : 7|8@0+ (1,0) [0|255] "" MC

BO_TX_BU_ 100 : MC,AMS;
SOMETHING_NEW_ 1 2 3;
CM_ SG_ 100 State "Still attached";
BA_DEF_REL_ BU_SG_REL_ "Foo" INT 0 1;
SIG_VALTYPE_ 100 State : 1;
"#,
        );
        let catalog = parse_dbc(&dbc).unwrap();
        assert_eq!(catalog.stats().num_messages, 1);
        let state = catalog.lookup(100).unwrap().signal("State").unwrap();
        assert_eq!(state.comment.as_deref(), Some("Still attached"));
    }

    #[test]
    fn test_unknown_attribute_type_does_not_abort() {
        let dbc = with_header(
            r#"
BO_ 100 Status: 8 MC
 SG_ State : 7|8@0+ (1,0) [0|255] "" MC

BA_DEF_ BO_ "Weird" FANCYTYPE 1 2;
"#,
        );
        let catalog = parse_dbc(&dbc).unwrap();
        assert!(catalog.lookup(100).is_some());
    }

    #[test]
    fn test_malformed_signal_reports_line() {
        // Header is lines 1-6, the blank line is 7
        let dbc = with_header(
            "\nBO_ 100 Status: 8 MC\n SG_ State : 7|8@2+ (1,0) [0|255] \"\" MC\n",
        );
        let err = parse_dbc(&dbc).unwrap_err();
        assert_eq!(err.line, 9);
        assert!(err.reason.contains("SG_ State"), "{}", err.reason);
    }

    #[test]
    fn test_signal_before_message_is_error() {
        let dbc = with_header(" SG_ State : 7|8@0+ (1,0) [0|255] \"\" MC\n");
        let err = parse_dbc(&dbc).unwrap_err();
        assert_eq!(err.line, 7);
    }

    #[test]
    fn test_unterminated_string_is_error() {
        let dbc = with_header(concat!(
            "\nBO_ 100 Status: 8 MC\n",
            " SG_ State : 7|8@0+ (1,0) [0|255] \"\" MC\n",
            "\nCM_ BO_ 100 \"never closed;\n",
        ));
        let err = parse_dbc(&dbc).unwrap_err();
        assert_eq!(err.line, 11);
    }

    #[test]
    fn test_missing_header_is_error() {
        let err = parse_dbc("BO_ 100 Status: 8 MC\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_out_of_frame_message_rejected_rest_loads() {
        let dbc = with_header(
            r#"
BO_ 100 Short: 2 MC
 SG_ Wide : 23|16@0+ (1,0) [0|100] "" MC

BO_ 101 Fine: 8 MC
 SG_ Narrow : 7|8@0+ (1,0) [0|100] "" MC
"#,
        );
        let catalog = parse_dbc(&dbc).unwrap();
        assert!(catalog.lookup(100).is_none());
        assert!(catalog.lookup(101).is_some());
        assert!(matches!(
            catalog.issues(),
            [LoadIssue::OutOfFrame { message, .. }] if message == "Short"
        ));
    }

    #[test]
    fn test_unmatched_comment_is_reported() {
        // Header is lines 1-6
        let dbc = with_header(
            r#"
BO_ 2147492410 Temperatures: 8 MC
 SG_ ControllerTemp : 7|16@0- (0.1,0) [0|100] "C" MC

CM_ BO_ 2147492411 "Refers to a message that does not exist";
CM_ SG_ 8762 ControllerTemp "Matches after masking";
CM_ SG_ 8762 Missing "No such signal";
"#,
        );
        let catalog = parse_dbc(&dbc).unwrap();
        let temp = catalog.lookup(8762).unwrap().signal("ControllerTemp").unwrap();
        assert_eq!(temp.comment.as_deref(), Some("Matches after masking"));

        let unmatched: Vec<_> = catalog
            .issues()
            .iter()
            .filter_map(|issue| match issue {
                LoadIssue::UnmatchedReference { line, .. } => Some(*line),
                _ => None,
            })
            .collect();
        assert_eq!(unmatched, vec![11, 13]);
        assert_eq!(catalog.stats().num_rejected, 0);
    }

    #[test]
    fn test_multiplexed_signals_may_share_bits() {
        let dbc = with_header(
            r#"
BO_ 512 Muxed: 8 MC
 SG_ Mode M : 7|8@0+ (1,0) [0|3] "" MC
 SG_ SignalA m0 : 15|16@0+ (1,0) [0|100] "%" MC
 SG_ SignalB m1 : 15|16@0+ (0.1,0) [0|1000] "mV" MC
"#,
        );
        let catalog = parse_dbc(&dbc).unwrap();
        let msg = catalog.lookup(512).unwrap();
        assert!(msg.is_multiplexed());
        assert_eq!(msg.multiplexer_signal().unwrap().name, "Mode");
        assert_eq!(
            msg.signal("SignalB").unwrap().multiplexer,
            Some(Multiplexer::Multiplexed(1))
        );
    }

    #[test]
    fn test_extended_multiplexer_indicator_is_multiplexed_on_value() {
        let dbc = with_header(
            r#"
BO_ 100 Nested: 8 MC
 SG_ Mode M : 7|8@0+ (1,0) [0|3] "" MC
 SG_ Sub m1M : 15|8@0+ (1,0) [0|255] "" MC
 SG_ Leaf m2 : 15|8@0+ (1,0) [0|255] "" MC

BO_ 101 Plain: 8 MC
 SG_ State : 7|8@0+ (1,0) [0|255] "" MC
"#,
        );
        let catalog = parse_dbc(&dbc).unwrap();
        assert!(catalog.issues().is_empty(), "{:?}", catalog.issues());
        assert!(catalog.lookup(101).is_some());
        let nested = catalog.lookup(100).unwrap();
        assert_eq!(
            nested.signal("Sub").unwrap().multiplexer,
            Some(Multiplexer::Multiplexed(1))
        );
    }

    #[test]
    fn test_environment_variable_value_table_is_skipped() {
        let dbc = with_header(
            r#"
BO_ 101 Status: 8 MC
 SG_ State : 7|8@0+ (1,0) [0|255] "" MC

VAL_ 101 State 0 "Idle" 1 "Run" ;
VAL_ EnvMode 0 "Off" 1 "On" ;
"#,
        );
        let catalog = parse_dbc(&dbc).unwrap();
        assert!(catalog.issues().is_empty(), "{:?}", catalog.issues());
        let state = catalog.lookup(101).unwrap().signal("State").unwrap();
        assert_eq!(state.describe(1), Some("Run"));
    }

    #[test]
    fn test_independent_signal_pseudo_message_is_ignored() {
        let dbc = with_header(
            r#"
BO_ 3221225472 VECTOR__INDEPENDENT_SIG_MSG: 0 Vector__XXX
 SG_ Orphan : 0|8@1+ (1,0) [0|0] "" Vector__XXX

BO_ 100 Status: 8 MC
 SG_ State : 7|8@0+ (1,0) [0|255] "" MC
"#,
        );
        let catalog = parse_dbc(&dbc).unwrap();
        assert_eq!(catalog.stats().num_messages, 1);
        assert!(catalog.issues().is_empty());
    }

    #[test]
    fn test_parse_dbc_file_reports_path() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(with_header("BO_ 100 Status 8 MC\n").as_bytes())
            .unwrap();
        temp_file.flush().unwrap();

        let err = parse_dbc_file(temp_file.path()).unwrap_err();
        match err {
            DecoderError::DbcParseError { path, source } => {
                assert_eq!(path, temp_file.path());
                assert_eq!(source.line, 7);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_parse_dbc_file_latin1_fallback() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let mut content = with_header("BO_ 100 Status: 8 MC\n").into_bytes();
        content.extend_from_slice(b" SG_ Temp : 7|8@0+ (1,0) [0|255] \"\xB0C\" MC\n");
        temp_file.write_all(&content).unwrap();
        temp_file.flush().unwrap();

        let catalog = parse_dbc_file(temp_file.path()).unwrap();
        let unit = catalog.lookup(100).unwrap().signal("Temp").unwrap().unit.clone();
        assert_eq!(unit.as_deref(), Some("°C"));
    }
}
