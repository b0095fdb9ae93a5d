//! Text to tree parsing. Parser functions are named after the W3C XML
//! grammar productions they implement.

#![allow(non_snake_case)]

use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, take_until, take_while};
use nom::character::complete::{char, digit1, hex_digit1, multispace0, multispace1, satisfy};
use nom::combinator::{map, opt, recognize};
use nom::error::{Error as NomError, ErrorKind};
use nom::multi::{many0, many0_count};
use nom::sequence::{delimited, pair, preceded, separated_pair, terminated, tuple};
use nom::{Err, IResult, Offset};

use thiserror::Error;

use super::{Attr, NodeId, NodeKind, QName, TextPos, Tree, NS_XML_URI};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("syntax error at {pos}: {message}")]
    Syntax { message: String, pos: TextPos },

    #[error("mismatched end tag at {pos}: expected </{expected}>, found </{found}>")]
    MismatchedTag {
        expected: String,
        found: String,
        pos: TextPos,
    },

    #[error("unbound namespace prefix `{prefix}` at {pos}")]
    UnboundPrefix { prefix: String, pos: TextPos },

    #[error("content after the document element at {pos}")]
    TrailingContent { pos: TextPos },
}

impl Tree {
    /// Parses a complete XML document.
    ///
    /// The whole input is consumed up front; there is no incremental mode.
    /// Character and predefined entity references are resolved into the
    /// surrounding text. A reference to an undeclared entity becomes an
    /// entity reference node in content and an error in an attribute value.
    pub fn parse(input: &str) -> Result<Tree, ParseError> {
        let mut builder = TreeBuilder::new(input);
        let mut rest = input.strip_prefix('\u{feff}').unwrap_or(input);
        if let Ok((r, decl)) = XMLDecl(rest) {
            builder.tree.xml_version = Some(decl.version.to_string());
            builder.tree.xml_encoding = decl.encoding.map(str::to_string);
            builder.tree.xml_standalone = decl.standalone;
            rest = r;
        }
        rest = builder.misc_run(rest, true)?;
        rest = builder.parse_element(rest)?;
        rest = builder.misc_run(rest, false)?;
        if !rest.is_empty() {
            let pos = builder.pos_at(builder.offset(rest));
            return Err(ParseError::TrailingContent { pos });
        }
        Ok(builder.finish())
    }
}

// [2] Char ::= #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]
fn is_xml_char_t(chr: char) -> bool {
    chr == '\u{9}'
        || chr == '\u{A}'
        || chr == '\u{D}'
        || (chr >= '\u{20}' && chr <= '\u{D7FF}')
        || (chr >= '\u{E000}' && chr <= '\u{FFFD}')
        || (chr >= '\u{10000}' && chr <= '\u{10FFFF}')
}

// [4] NameStartChar ::= ":" | [A-Z] | "_" | [a-z] | [#xC0-#xD6] | ...
fn is_namestart_char_t(chr: char) -> bool {
    chr == ':'
        || chr == '_'
        || (chr >= 'A' && chr <= 'Z')
        || (chr >= 'a' && chr <= 'z')
        || (chr >= '\u{C0}' && chr <= '\u{D6}')
        || (chr >= '\u{D8}' && chr <= '\u{F6}')
        || (chr >= '\u{F8}' && chr <= '\u{2FF}')
        || (chr >= '\u{370}' && chr <= '\u{37D}')
        || (chr >= '\u{37F}' && chr <= '\u{1FFF}')
        || (chr >= '\u{200C}' && chr <= '\u{200D}')
        || (chr >= '\u{2070}' && chr <= '\u{218F}')
        || (chr >= '\u{2C00}' && chr <= '\u{2FEF}')
        || (chr >= '\u{3001}' && chr <= '\u{D7FF}')
        || (chr >= '\u{F900}' && chr <= '\u{FDCF}')
        || (chr >= '\u{FDF0}' && chr <= '\u{FFFD}')
        || (chr >= '\u{10000}' && chr <= '\u{EFFFF}')
}

// [4a] NameChar ::= NameStartChar | "-" | "." | [0-9] | #xB7 | [#x300-#x36F] | [#x203F-#x2040]
fn is_namechar_t(chr: char) -> bool {
    is_namestart_char_t(chr)
        || chr == '-'
        || chr == '.'
        || (chr >= '0' && chr <= '9')
        || chr == '\u{B7}'
        || (chr >= '\u{300}' && chr <= '\u{36F}')
        || (chr >= '\u{203F}' && chr <= '\u{2040}')
}

// [13] PubidChar ::= #x20 | #xD | #xA | [a-zA-Z0-9] | [-'()+,./:=?;!*#@$_%]
fn is_pubid_char_t(chr: char) -> bool {
    chr == ' '
        || chr == '\r'
        || chr == '\n'
        || chr.is_ascii_alphanumeric()
        || "-'()+,./:=?;!*#@$_%".contains(chr)
}

// [5] Name ::= NameStartChar (NameChar)*
fn Name(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_namestart_char_t), take_while(is_namechar_t)))(input)
}

// [25] Eq ::= S? '=' S?
fn Eq(input: &str) -> IResult<&str, &str> {
    delimited(multispace0, tag("="), multispace0)(input)
}

/// A resolved reference: either a character it stands for, or the name of
/// an entity this parser has no definition for.
#[derive(Debug, PartialEq)]
enum Ref<'a> {
    Char(char),
    Entity(&'a str),
}

// [66] CharRef ::= '&#' [0-9]+ ';' | '&#x' [0-9a-fA-F]+ ';'
fn CharRef(input: &str) -> IResult<&str, Ref<'_>> {
    let (rest, code) = alt((
        map(delimited(tag("&#x"), hex_digit1, char(';')), |d: &str| {
            u32::from_str_radix(d, 16).ok()
        }),
        map(delimited(tag("&#"), digit1, char(';')), |d: &str| {
            d.parse::<u32>().ok()
        }),
    ))(input)?;
    match code.and_then(char::from_u32).filter(|&c| is_xml_char_t(c)) {
        Some(c) => Ok((rest, Ref::Char(c))),
        None => Err(Err::Error(NomError::new(input, ErrorKind::Verify))),
    }
}

// [68] EntityRef ::= '&' Name ';'
fn EntityRef(input: &str) -> IResult<&str, Ref<'_>> {
    let (rest, name) = delimited(char('&'), Name, char(';'))(input)?;
    let resolved = match name {
        "lt" => Ref::Char('<'),
        "gt" => Ref::Char('>'),
        "amp" => Ref::Char('&'),
        "apos" => Ref::Char('\''),
        "quot" => Ref::Char('"'),
        _ => Ref::Entity(name),
    };
    Ok((rest, resolved))
}

// [67] Reference ::= EntityRef | CharRef
fn Reference(input: &str) -> IResult<&str, Ref<'_>> {
    alt((CharRef, EntityRef))(input)
}

// [10] AttValue ::= '"' ([^<&"] | Reference)* '"' | "'" ([^<&'] | Reference)* "'"
// Returned raw; references are resolved by unescape_value.
fn AttValue(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(
            char('"'),
            recognize(many0_count(alt((is_not("<&\""), recognize(Reference))))),
            char('"'),
        ),
        delimited(
            char('\''),
            recognize(many0_count(alt((is_not("<&'"), recognize(Reference))))),
            char('\''),
        ),
    ))(input)
}

// [41] Attribute ::= Name Eq AttValue
fn Attribute(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(Name, Eq, AttValue)(input)
}

#[derive(Debug)]
struct RawStart<'a> {
    name: &'a str,
    attributes: Vec<(&'a str, &'a str)>,
    is_empty: bool,
}

// [40] STag ::= '<' Name (S Attribute)* S? '>'
fn STag(input: &str) -> IResult<&str, RawStart<'_>> {
    map(
        tuple((
            char('<'),
            Name,
            many0(preceded(multispace1, Attribute)),
            multispace0,
            char('>'),
        )),
        |(_, name, attributes, _, _)| RawStart {
            name,
            attributes,
            is_empty: false,
        },
    )(input)
}

// [44] EmptyElemTag ::= '<' Name (S Attribute)* S? '/>'
fn EmptyElemTag(input: &str) -> IResult<&str, RawStart<'_>> {
    map(
        tuple((
            char('<'),
            Name,
            many0(preceded(multispace1, Attribute)),
            multispace0,
            tag("/>"),
        )),
        |(_, name, attributes, _, _)| RawStart {
            name,
            attributes,
            is_empty: true,
        },
    )(input)
}

// [42] ETag ::= '</' Name S? '>'
fn ETag(input: &str) -> IResult<&str, &str> {
    delimited(tag("</"), Name, pair(multispace0, char('>')))(input)
}

// [14] CharData ::= [^<&]* - ([^<&]* ']]>' [^<&]*)
// Stops at markup, references, a stray ']]>' and non-XML characters; the
// latter two then fail as unmatchable content.
fn CharData(input: &str) -> IResult<&str, &str> {
    let mut end = input.len();
    for (i, c) in input.char_indices() {
        if c == '<' || c == '&' || !is_xml_char_t(c) {
            end = i;
            break;
        }
        if c == ']' && input[i..].starts_with("]]>") {
            end = i;
            break;
        }
    }
    if end == 0 {
        return Err(Err::Error(NomError::new(input, ErrorKind::TakeWhile1)));
    }
    Ok((&input[end..], &input[..end]))
}

// [18] CDSect ::= '<![CDATA[' CData ']]>'
fn CDSect(input: &str) -> IResult<&str, &str> {
    delimited(tag("<![CDATA["), take_until("]]>"), tag("]]>"))(input)
}

// [15] Comment ::= '<!--' ((Char - '-') | ('-' (Char - '-')))* '-->'
// take_until stops at the first '--', so a double hyphen inside the body
// fails the closing tag.
fn Comment(input: &str) -> IResult<&str, &str> {
    delimited(tag("<!--"), take_until("--"), tag("-->"))(input)
}

// [16] PI ::= '<?' PITarget (S (Char* - (Char* '?>' Char*)))? '?>'
// [17] PITarget ::= Name - (('X' | 'x') ('M' | 'm') ('L' | 'l'))
fn PI(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    let (rest, _) = tag("<?")(input)?;
    let (rest, target) = Name(rest)?;
    if target.eq_ignore_ascii_case("xml") {
        return Err(Err::Error(NomError::new(input, ErrorKind::Tag)));
    }
    let (rest, data) = opt(preceded(multispace1, take_until("?>")))(rest)?;
    let (rest, _) = tag("?>")(rest)?;
    Ok((rest, (target, data)))
}

// [26] VersionNum ::= '1.' [0-9]+
fn VersionNum(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("1."), digit1))(input)
}

// [24] VersionInfo ::= S 'version' Eq ("'" VersionNum "'" | '"' VersionNum '"')
fn VersionInfo(input: &str) -> IResult<&str, &str> {
    preceded(
        tuple((multispace1, tag("version"), Eq)),
        alt((
            delimited(char('"'), VersionNum, char('"')),
            delimited(char('\''), VersionNum, char('\'')),
        )),
    )(input)
}

// [81] EncName ::= [A-Za-z] ([A-Za-z0-9._] | '-')*
fn EncName(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'),
    ))(input)
}

// [80] EncodingDecl ::= S 'encoding' Eq ('"' EncName '"' | "'" EncName "'")
fn EncodingDecl(input: &str) -> IResult<&str, &str> {
    preceded(
        tuple((multispace1, tag("encoding"), Eq)),
        alt((
            delimited(char('"'), EncName, char('"')),
            delimited(char('\''), EncName, char('\'')),
        )),
    )(input)
}

// [32] SDDecl ::= S 'standalone' Eq (("'" ('yes' | 'no') "'") | ('"' ('yes' | 'no') '"'))
fn SDDecl(input: &str) -> IResult<&str, &str> {
    preceded(
        tuple((multispace1, tag("standalone"), Eq)),
        alt((
            delimited(char('"'), alt((tag("yes"), tag("no"))), char('"')),
            delimited(char('\''), alt((tag("yes"), tag("no"))), char('\'')),
        )),
    )(input)
}

#[derive(Debug)]
struct XmlDeclInfo<'a> {
    version: &'a str,
    encoding: Option<&'a str>,
    standalone: Option<bool>,
}

// [23] XMLDecl ::= '<?xml' VersionInfo EncodingDecl? SDDecl? S? '?>'
fn XMLDecl(input: &str) -> IResult<&str, XmlDeclInfo<'_>> {
    map(
        tuple((
            tag("<?xml"),
            VersionInfo,
            opt(EncodingDecl),
            opt(SDDecl),
            multispace0,
            tag("?>"),
        )),
        |(_, version, encoding, standalone, _, _)| XmlDeclInfo {
            version,
            encoding,
            standalone: standalone.map(|s| s == "yes"),
        },
    )(input)
}

// [11] SystemLiteral ::= ('"' [^"]* '"') | ("'" [^']* "'")
fn SystemLiteral(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
    ))(input)
}

// [12] PubidLiteral ::= '"' PubidChar* '"' | "'" (PubidChar - "'")* "'"
fn PubidLiteral(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_while(is_pubid_char_t), char('"')),
        delimited(
            char('\''),
            take_while(|c| is_pubid_char_t(c) && c != '\''),
            char('\''),
        ),
    ))(input)
}

// [75] ExternalID ::= 'SYSTEM' S SystemLiteral | 'PUBLIC' S PubidLiteral S SystemLiteral
fn ExternalID(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(tuple((tag("SYSTEM"), multispace1, SystemLiteral))),
        recognize(tuple((
            tag("PUBLIC"),
            multispace1,
            PubidLiteral,
            multispace1,
            SystemLiteral,
        ))),
    ))(input)
}

// [28] doctypedecl ::= '<!DOCTYPE' S Name (S ExternalID)? S? ('[' intSubset ']' S?)? '>'
// Captured raw and never interpreted. The internal subset is skipped to the
// first ']' without bracket nesting.
fn doctypedecl(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        tag("<!DOCTYPE"),
        multispace1,
        Name,
        opt(preceded(multispace1, ExternalID)),
        multispace0,
        opt(terminated(
            delimited(char('['), take_while(|c| c != ']'), char(']')),
            multispace0,
        )),
        char('>'),
    )))(input)
}

#[derive(Debug)]
enum Content<'a> {
    CharData(&'a str),
    Start(RawStart<'a>),
    End(&'a str),
    Reference(Ref<'a>),
    Cdata(&'a str),
    Comment(&'a str),
    PI((&'a str, Option<&'a str>)),
}

// [43] content ::= CharData? ((element | Reference | CDSect | PI | Comment) CharData?)*
fn content_item(input: &str) -> IResult<&str, Content<'_>> {
    alt((
        map(CharData, Content::CharData),
        map(STag, Content::Start),
        map(EmptyElemTag, Content::Start),
        map(ETag, Content::End),
        map(Reference, Content::Reference),
        map(CDSect, Content::Cdata),
        map(Comment, Content::Comment),
        map(PI, Content::PI),
    ))(input)
}

/// Resolves character and predefined entity references in an attribute
/// value. Returns the offending reference text when one cannot be resolved.
fn unescape_value(raw: &str) -> Result<String, String> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        match Reference(&rest[i..]) {
            Ok((after, Ref::Char(c))) => {
                out.push(c);
                rest = after;
            }
            Ok((_, Ref::Entity(name))) => return Err(name.to_string()),
            Err(_) => return Err(rest[i..].chars().take(12).collect()),
        }
    }
    out.push_str(rest);
    Ok(out)
}

// Splits a qualified name at its first colon.
fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.find(':') {
        Some(i) => (Some(&name[..i]), &name[i + 1..]),
        None => (None, name),
    }
}

fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn text_pos_at(input: &str, offset: usize) -> TextPos {
    let head = &input[..offset.min(input.len())];
    let row = head.bytes().filter(|&b| b == b'\n').count() as u32 + 1;
    let line_start = head.rfind('\n').map_or(0, |i| i + 1);
    let col = head[line_start..].chars().count() as u32 + 1;
    TextPos::new(row, col)
}

struct NsBinding {
    depth: usize,
    prefix: String,
    uri: String,
}

struct TreeBuilder<'a> {
    input: &'a str,
    tree: Tree,
    // node source offsets, pushed in document order
    offsets: Vec<(NodeId, usize)>,
    // open elements
    stack: Vec<NodeId>,
    // in-scope namespace declarations, innermost last
    ns: Vec<NsBinding>,
    pending_text: String,
    pending_start: usize,
    saw_doctype: bool,
}

impl<'a> TreeBuilder<'a> {
    fn new(input: &'a str) -> TreeBuilder<'a> {
        TreeBuilder {
            input,
            tree: Tree::new(),
            offsets: Vec::new(),
            stack: Vec::new(),
            ns: Vec::new(),
            pending_text: String::new(),
            pending_start: 0,
            saw_doctype: false,
        }
    }

    fn offset(&self, rest: &str) -> usize {
        self.input.offset(rest)
    }

    fn pos_at(&self, offset: usize) -> TextPos {
        text_pos_at(self.input, offset)
    }

    fn syntax(&self, rest: &str, message: &str) -> ParseError {
        ParseError::Syntax {
            message: message.to_string(),
            pos: self.pos_at(self.offset(rest)),
        }
    }

    fn parent(&self) -> NodeId {
        self.stack.last().copied().unwrap_or_else(|| self.tree.root())
    }

    fn record(&mut self, id: NodeId, at: usize) {
        self.offsets.push((id, at));
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(NS_XML_URI);
        }
        self.ns
            .iter()
            .rev()
            .find(|b| b.prefix == prefix)
            .map(|b| b.uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    fn unbind(&mut self, level: usize) {
        while self.ns.last().map_or(false, |b| b.depth > level) {
            self.ns.pop();
        }
    }

    fn push_text(&mut self, chunk: &str, at: usize) {
        if self.pending_text.is_empty() {
            self.pending_start = at;
        }
        self.pending_text.push_str(chunk);
    }

    fn push_char(&mut self, c: char, at: usize) {
        if self.pending_text.is_empty() {
            self.pending_start = at;
        }
        self.pending_text.push(c);
    }

    fn flush_text(&mut self) {
        if self.pending_text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending_text);
        let parent = self.parent();
        let id = self.tree.append_raw(parent, NodeKind::Text, None, Some(text));
        self.record(id, self.pending_start);
    }

    /// Comments, processing instructions and whitespace around the document
    /// element. The prolog additionally allows one doctype declaration.
    fn misc_run(&mut self, mut rest: &'a str, in_prolog: bool) -> Result<&'a str, ParseError> {
        loop {
            rest = rest.trim_start_matches(is_xml_space);
            let at = self.offset(rest);
            if let Ok((r, text)) = Comment(rest) {
                let parent = self.parent();
                let id = self
                    .tree
                    .append_raw(parent, NodeKind::Comment, None, Some(text.to_string()));
                self.record(id, at);
                rest = r;
                continue;
            }
            if let Ok((r, (target, data))) = PI(rest) {
                let parent = self.parent();
                let id = self.tree.append_raw(
                    parent,
                    NodeKind::ProcessingInstruction,
                    Some(QName::local(target)),
                    data.map(str::to_string),
                );
                self.record(id, at);
                rest = r;
                continue;
            }
            if in_prolog {
                if let Ok((r, raw)) = doctypedecl(rest) {
                    if self.saw_doctype {
                        return Err(self.syntax(rest, "multiple doctype declarations"));
                    }
                    self.saw_doctype = true;
                    let parent = self.parent();
                    let id = self
                        .tree
                        .append_raw(parent, NodeKind::Doctype, None, Some(raw.to_string()));
                    self.record(id, at);
                    rest = r;
                    continue;
                }
            }
            return Ok(rest);
        }
    }

    /// The document element and everything inside it.
    fn parse_element(&mut self, rest: &'a str) -> Result<&'a str, ParseError> {
        let at = self.offset(rest);
        let (mut rest, start) = alt((STag, EmptyElemTag))(rest)
            .map_err(|_| self.syntax(rest, "expected an element start tag"))?;
        self.open_element(&start, at)?;
        if start.is_empty {
            return Ok(rest);
        }
        loop {
            if rest.is_empty() {
                return Err(self.syntax(rest, "unexpected end of input inside an element"));
            }
            let at = self.offset(rest);
            let (r, item) = match content_item(rest) {
                Ok(parsed) => parsed,
                Err(_) if rest.starts_with('&') => {
                    return Err(self.syntax(rest, "invalid character or entity reference"));
                }
                Err(_) => return Err(self.syntax(rest, "malformed content")),
            };
            rest = r;
            match item {
                Content::CharData(s) => self.push_text(s, at),
                Content::Reference(Ref::Char(c)) => self.push_char(c, at),
                Content::Reference(Ref::Entity(name)) => {
                    self.flush_text();
                    let parent = self.parent();
                    let id = self.tree.append_raw(
                        parent,
                        NodeKind::EntityReference,
                        Some(QName::local(name)),
                        None,
                    );
                    self.record(id, at);
                }
                Content::Cdata(s) => {
                    self.flush_text();
                    let parent = self.parent();
                    let id = self
                        .tree
                        .append_raw(parent, NodeKind::Cdata, None, Some(s.to_string()));
                    self.record(id, at);
                }
                Content::Comment(s) => {
                    self.flush_text();
                    let parent = self.parent();
                    let id = self
                        .tree
                        .append_raw(parent, NodeKind::Comment, None, Some(s.to_string()));
                    self.record(id, at);
                }
                Content::PI((target, data)) => {
                    self.flush_text();
                    let parent = self.parent();
                    let id = self.tree.append_raw(
                        parent,
                        NodeKind::ProcessingInstruction,
                        Some(QName::local(target)),
                        data.map(str::to_string),
                    );
                    self.record(id, at);
                }
                Content::Start(start) => {
                    self.flush_text();
                    self.open_element(&start, at)?;
                }
                Content::End(name) => {
                    self.flush_text();
                    self.close_element(name, at)?;
                    if self.stack.is_empty() {
                        return Ok(rest);
                    }
                }
            }
        }
    }

    fn open_element(&mut self, start: &RawStart<'_>, at: usize) -> Result<(), ParseError> {
        let pos = self.pos_at(at);
        let level = self.stack.len() + 1;

        // declarations first, so the element's own name can use them
        for (name, raw) in &start.attributes {
            let (prefix, local) = split_qualified(name);
            let is_default = prefix.is_none() && local == "xmlns";
            if prefix == Some("xmlns") || is_default {
                let uri = unescape_value(raw).map_err(|r| ParseError::Syntax {
                    message: format!("unresolved reference &{};", r),
                    pos,
                })?;
                self.ns.push(NsBinding {
                    depth: level,
                    prefix: if is_default {
                        String::new()
                    } else {
                        local.to_string()
                    },
                    uri,
                });
            }
        }

        let (eprefix, elocal) = split_qualified(start.name);
        let namespace = match eprefix {
            Some(p) => Some(
                self.lookup(p)
                    .ok_or_else(|| ParseError::UnboundPrefix {
                        prefix: p.to_string(),
                        pos,
                    })?
                    .to_string(),
            ),
            None => self.lookup("").map(str::to_string),
        };
        let qname = QName {
            name: start.name.to_string(),
            local_name: elocal.to_string(),
            prefix: eprefix.map(str::to_string),
            namespace,
        };
        let parent = self.parent();
        let id = self
            .tree
            .append_raw(parent, NodeKind::Element, Some(qname), None);
        self.record(id, at);

        for (name, raw) in &start.attributes {
            let (prefix, local) = split_qualified(name);
            let value = unescape_value(raw).map_err(|r| ParseError::Syntax {
                message: format!("unresolved reference &{};", r),
                pos,
            })?;
            let namespace = match prefix {
                Some("xmlns") | None => None,
                Some(p) => Some(
                    self.lookup(p)
                        .ok_or_else(|| ParseError::UnboundPrefix {
                            prefix: p.to_string(),
                            pos,
                        })?
                        .to_string(),
                ),
            };
            self.tree.push_attribute(
                id,
                Attr {
                    name: QName {
                        name: name.to_string(),
                        local_name: local.to_string(),
                        prefix: prefix.map(str::to_string),
                        namespace,
                    },
                    value,
                },
            );
        }

        if start.is_empty {
            self.unbind(self.stack.len());
        } else {
            self.stack.push(id);
        }
        Ok(())
    }

    fn close_element(&mut self, name: &str, at: usize) -> Result<(), ParseError> {
        let pos = self.pos_at(at);
        let open = match self.stack.pop() {
            Some(id) => id,
            None => {
                return Err(ParseError::Syntax {
                    message: format!("unexpected end tag </{}>", name),
                    pos,
                })
            }
        };
        let expected = self.tree.name(open).map(|q| q.name.as_str()).unwrap_or("");
        if expected != name {
            return Err(ParseError::MismatchedTag {
                expected: expected.to_string(),
                found: name.to_string(),
                pos,
            });
        }
        self.unbind(self.stack.len());
        Ok(())
    }

    fn finish(mut self) -> Tree {
        let bytes = self.input.as_bytes();
        let mut scanned = 0usize;
        let mut row = 1u32;
        let mut line_start = 0usize;
        for (id, off) in std::mem::take(&mut self.offsets) {
            while scanned < off {
                if bytes[scanned] == b'\n' {
                    row += 1;
                    line_start = scanned + 1;
                }
                scanned += 1;
            }
            let col = self.input[line_start..off].chars().count() as u32 + 1;
            self.tree.set_pos(id, TextPos::new(row, col));
        }
        self.tree
    }
}

#[test]
fn test_name() {
    assert_eq!(Name("tag rest"), Ok((" rest", "tag")));
    assert_eq!(Name("ns:tag>"), Ok((">", "ns:tag")));
    assert!(Name("1tag").is_err());
}

#[test]
fn test_attribute() {
    assert_eq!(Attribute(r#"attr="value""#), Ok(("", ("attr", "value"))));
    assert_eq!(Attribute("attr = 'value' rest"), Ok((" rest", ("attr", "value"))));
    assert_eq!(Attribute(r#"a="x&amp;y""#), Ok(("", ("a", "x&amp;y"))));
    assert!(Attribute(r#"a="1"#).is_err());
}

#[test]
fn test_stag() {
    let (rest, start) = STag(r#"<test a="1" b='2'>x"#).unwrap();
    assert_eq!(rest, "x");
    assert_eq!(start.name, "test");
    assert_eq!(start.attributes, vec![("a", "1"), ("b", "2")]);
    assert!(!start.is_empty);
    assert!(STag("<test/>").is_err());
    assert!(STag(r#"<test a="1"b="2">"#).is_err());
}

#[test]
fn test_empty_elem_tag() {
    let (rest, start) = EmptyElemTag("<br/>x").unwrap();
    assert_eq!(rest, "x");
    assert_eq!(start.name, "br");
    assert!(start.is_empty);
    let (_, start) = EmptyElemTag(r#"<img src="a" />"#).unwrap();
    assert_eq!(start.attributes, vec![("src", "a")]);
}

#[test]
fn test_etag() {
    assert_eq!(ETag("</test>rest"), Ok(("rest", "test")));
    assert_eq!(ETag("</test >"), Ok(("", "test")));
    assert!(ETag("<test>").is_err());
}

#[test]
fn test_chardata() {
    assert_eq!(CharData("abc<tag>"), Ok(("<tag>", "abc")));
    assert_eq!(CharData("a&amp;b"), Ok(("&amp;b", "a")));
    assert!(CharData("<tag>").is_err());
    assert_eq!(CharData("ab]]>c"), Ok(("]]>c", "ab")));
    assert!(CharData("]]>").is_err());
}

#[test]
fn test_comment() {
    assert_eq!(Comment("<!-- ok --><x/>"), Ok(("<x/>", " ok ")));
    assert_eq!(Comment("<!---->cc"), Ok(("cc", "")));
    assert!(Comment("<!-- a--b -->").is_err());
    assert!(Comment("<!-- unterminated").is_err());
}

#[test]
fn test_cdsect() {
    assert_eq!(CDSect("<![CDATA[a<b&c]]>rest"), Ok(("rest", "a<b&c")));
    assert_eq!(CDSect("<![CDATA[]]>"), Ok(("", "")));
}

#[test]
fn test_pi() {
    assert_eq!(PI("<?go?>"), Ok(("", ("go", None))));
    assert_eq!(PI("<?go now then?>x"), Ok(("x", ("go", Some("now then")))));
    assert!(PI(r#"<?xml version="1.0"?>"#).is_err());
}

#[test]
fn test_reference() {
    assert_eq!(Reference("&lt;x"), Ok(("x", Ref::Char('<'))));
    assert_eq!(Reference("&#65;"), Ok(("", Ref::Char('A'))));
    assert_eq!(Reference("&#x2764;"), Ok(("", Ref::Char('\u{2764}'))));
    assert_eq!(Reference("&custom;"), Ok(("", Ref::Entity("custom"))));
    assert!(Reference("&#x110000;").is_err());
    assert!(Reference("&;").is_err());
}

#[test]
fn test_attvalue_rejects_raw_markup() {
    assert!(Attribute(r#"a="x<y""#).is_err());
    assert!(Attribute(r#"a="x&y""#).is_err());
}

#[test]
fn test_xmldecl() {
    let (_, d) = XMLDecl(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#).unwrap();
    assert_eq!(d.version, "1.0");
    assert_eq!(d.encoding, Some("UTF-8"));
    assert_eq!(d.standalone, Some(true));
    let (_, d) = XMLDecl("<?xml version='1.1'?>").unwrap();
    assert_eq!(d.version, "1.1");
    assert_eq!(d.encoding, None);
    assert_eq!(d.standalone, None);
    assert!(XMLDecl(r#"<?xml encoding="UTF-8"?>"#).is_err());
}

#[test]
fn test_doctypedecl() {
    assert_eq!(
        doctypedecl("<!DOCTYPE greeting>x"),
        Ok(("x", "<!DOCTYPE greeting>"))
    );
    let raw = r#"<!DOCTYPE greeting SYSTEM "hello.dtd">"#;
    assert_eq!(doctypedecl(raw), Ok(("", raw)));
    let raw = r#"<!DOCTYPE doc [ <!ENTITY e "v"> ]>"#;
    assert_eq!(doctypedecl(raw), Ok(("", raw)));
}

#[test]
fn test_unescape_value() {
    assert_eq!(unescape_value("plain").unwrap(), "plain");
    assert_eq!(unescape_value("a&lt;b&#33;").unwrap(), "a<b!");
    assert_eq!(unescape_value("&quot;&apos;").unwrap(), "\"'");
    assert_eq!(unescape_value("x&nope;y").unwrap_err(), "nope");
}

#[test]
fn test_text_pos_at() {
    let s = "ab\ncde\nf";
    assert_eq!(text_pos_at(s, 0), TextPos::new(1, 1));
    assert_eq!(text_pos_at(s, 4), TextPos::new(2, 2));
    assert_eq!(text_pos_at(s, 7), TextPos::new(3, 1));
}
