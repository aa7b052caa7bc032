//! PEG-style grammar over the token stream.
//!
//! The grammar is ordered-choice recursive descent over a token
//! cursor, with `opt` / `many` / `alt` combinators. Statements are
//! delimited by `;`; a failed statement is reported and skipped so a
//! single pass can surface several errors. Ranges inside bracketed
//! lists stay symbolic; they expand during finalization, not here.

use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::hid_db::HidDb;
use crate::models::expression::{
    AnimationDefExpr, AnimationFrameExpr, AssignmentExpr, CapabilityArgDecl, CapabilityExpr,
    Combo, ComboElem, DefineExpr, Expression, ExpressionKind, IdRange, MapOperator, MappingExpr,
    OpKind, Origin, PixelChannelsExpr, PixelMod, PixelModExpr, PixelModOp, PixelPositionExpr,
    RangeKind, RangePart, ScanCodePositionExpr, ScheduledId, Sequence,
};
use crate::models::id::{
    AnimationId, AnimationModifier, CapabilityArg, CapabilityCall, GenericTriggerId, HidId,
    HidKind, Id, LayerId, ModifierArg, PixelAddressMode, PixelChannel, PixelId, PixelLayerId,
    ScanCodeId,
};
use crate::models::position::PhysicalPosition;
use crate::models::schedule::{Schedule, ScheduleParam, ScheduleState, Time, TimeUnit};
use crate::parser::tokenizer::{Namespace, Token, TokenKind};

/// Grammar failure at a specific token.
#[derive(Debug, Clone)]
struct ParseFail {
    line: u32,
    col: u32,
    expected: String,
    got: String,
    kind: DiagnosticKind,
}

impl ParseFail {
    fn diagnostic(&self, file: &str) -> Diagnostic {
        Diagnostic::error(
            self.kind,
            format!("expected {}, got {}", self.expected, self.got),
        )
        .at(file, self.line, self.col)
    }
}

type PResult<T> = Result<T, ParseFail>;

/// Cursor over one statement's tokens.
struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    /// End-of-statement position for error reporting
    end_line: u32,
    end_col: u32,
    hid: &'a HidDb,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token], hid: &'a HidDb) -> Self {
        let (end_line, end_col) = tokens
            .last()
            .map_or((1, 1), |t| (t.line, t.col + t.text.len() as u32));
        Self {
            tokens,
            pos: 0,
            end_line,
            end_col,
            hid,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Failure describing what was expected at the current position.
    fn fail(&self, expected: impl Into<String>) -> ParseFail {
        match self.peek() {
            Some(token) => ParseFail {
                line: token.line,
                col: token.col,
                expected: expected.into(),
                got: format!("'{}'", token.text),
                kind: DiagnosticKind::Parse,
            },
            None => ParseFail {
                line: self.end_line,
                col: self.end_col,
                expected: expected.into(),
                got: "end of statement".to_string(),
                kind: DiagnosticKind::Parse,
            },
        }
    }

    fn semantic_fail(&self, expected: impl Into<String>) -> ParseFail {
        let mut fail = self.fail(expected);
        fail.kind = DiagnosticKind::Semantic;
        fail
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> PResult<&'a Token> {
        if self.peek_kind() == Some(kind) {
            Ok(self.next().unwrap())
        } else {
            Err(self.fail(expected))
        }
    }

    /// Zero-or-one: backtracks on failure.
    fn opt<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> Option<T> {
        let save = self.pos;
        match f(self) {
            Ok(value) => Some(value),
            Err(_) => {
                self.pos = save;
                None
            }
        }
    }

    /// Ordered choice: first alternative to parse wins; on total
    /// failure the error from the furthest-reaching alternative is
    /// kept (earliest unreducible position overall).
    fn alt<T>(&mut self, alternatives: &[&dyn Fn(&mut Self) -> PResult<T>]) -> PResult<T> {
        let save = self.pos;
        let mut best: Option<ParseFail> = None;
        let mut best_pos = 0;

        for alternative in alternatives {
            self.pos = save;
            match alternative(self) {
                Ok(value) => return Ok(value),
                Err(fail) => {
                    if best.is_none() || self.pos > best_pos {
                        best_pos = self.pos;
                        best = Some(fail);
                    }
                }
            }
        }

        self.pos = save;
        Err(best.unwrap_or_else(|| self.fail("expression")))
    }
}

/// Parses an unsigned numeric literal (decimal, hex, binary).
fn parse_number(text: &str) -> Option<u32> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = text.strip_prefix("0b") {
        u32::from_str_radix(bin, 2).ok()
    } else {
        text.parse().ok()
    }
}

/// Splits a number token into value and timing unit, when suffixed.
fn parse_time(text: &str) -> Option<Time> {
    for suffix in ["ms", "us", "ns", "s"] {
        if let Some(amount) = text.strip_suffix(suffix) {
            // "0x43" must not read as a 0x4-with-3s timing
            if amount.is_empty() || amount.contains('x') || amount.contains('b') {
                return None;
            }
            return Some(Time {
                amount: amount.parse().ok()?,
                unit: TimeUnit::parse(suffix)?,
            });
        }
    }
    None
}

fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'')
}

// === Schedules ===

fn schedule_param(cur: &mut Cursor) -> PResult<ScheduleParam> {
    match cur.peek() {
        Some(token) if token.kind == TokenKind::Number => {
            let token = cur.next().unwrap();
            if let Some(time) = parse_time(&token.text) {
                Ok(ScheduleParam::Timing(time))
            } else {
                let value = parse_number(&token.text)
                    .ok_or_else(|| cur.fail("analog value"))?;
                Ok(ScheduleParam::Analog {
                    value: value as u16,
                })
            }
        }
        Some(token) if token.kind == TokenKind::Name => {
            let name = cur.next().unwrap().text.clone();
            let state = ScheduleState::parse(&name)
                .ok_or_else(|| cur.semantic_fail("schedule state (P,H,R,O,UP,UR,D,A)"))?;
            let timing = if cur.eat(TokenKind::Colon) {
                let token = cur.expect(TokenKind::Number, "timing value")?;
                Some(parse_time(&token.text).ok_or_else(|| cur.fail("timing with unit"))?)
            } else {
                None
            };
            Ok(ScheduleParam::State { state, timing })
        }
        _ => Err(cur.fail("schedule parameter")),
    }
}

/// Parses `(param, param, …)`. An empty `()` yields an empty schedule,
/// which is distinct from no schedule at all.
fn schedule_list(cur: &mut Cursor) -> PResult<Schedule> {
    cur.expect(TokenKind::ParenOpen, "'('")?;
    let mut params = Vec::new();
    if !cur.eat(TokenKind::ParenClose) {
        loop {
            params.push(schedule_param(cur)?);
            if cur.eat(TokenKind::Comma) {
                continue;
            }
            cur.expect(TokenKind::ParenClose, "')' or ','")?;
            break;
        }
    }
    Ok(Schedule { params })
}

fn opt_schedule(cur: &mut Cursor) -> Option<Schedule> {
    cur.opt(schedule_list)
}

// === Identifier atoms ===

fn hid_kind(ns: Namespace) -> Option<HidKind> {
    match ns {
        Namespace::Usb => Some(HidKind::Keyboard),
        Namespace::Consumer => Some(HidKind::Consumer),
        Namespace::System => Some(HidKind::System),
        Namespace::Indicator => Some(HidKind::Indicator),
        _ => None,
    }
}

/// Resolves the value part of a HID token (`"A"` or `0x28`) to an id.
///
/// The symbol is normalized to the database's canonical spelling so
/// that `U"a"`, `U"A"`, and `U0x04` all produce one canonical form and
/// therefore one trigger key.
fn resolve_hid(cur: &Cursor, kind: HidKind, value: &str) -> PResult<HidId> {
    if value.starts_with('"') {
        let symbol = strip_quotes(value);
        let code = cur
            .hid
            .lookup(kind, symbol)
            .ok_or_else(|| cur.semantic_fail(format!("known {} usage name", kind.prefix())))?;
        let canonical = cur.hid.name_of(kind, code).unwrap_or(symbol);
        Ok(HidId::named(kind, code, canonical))
    } else {
        let code = parse_number(value).ok_or_else(|| cur.fail("usage code"))? as u16;
        match cur.hid.name_of(kind, code) {
            Some(symbol) => Ok(HidId::named(kind, code, symbol)),
            None => Ok(HidId::new(kind, code)),
        }
    }
}

/// A namespaced single token (`U"A"`, `S0x43`, `P12`, `A"name"`).
fn namespaced_id(cur: &mut Cursor) -> PResult<Id> {
    let Some(token) = cur.peek() else {
        return Err(cur.fail("identifier"));
    };
    let TokenKind::Namespaced(ns) = token.kind else {
        return Err(cur.fail("identifier"));
    };
    let value = token.ns_value().to_string();
    cur.next();

    match ns {
        Namespace::ScanCode => {
            let code = parse_number(&value).ok_or_else(|| cur.fail("scan code"))?;
            Ok(Id::ScanCode(ScanCodeId::new(code as u16)))
        }
        Namespace::Pixel => {
            let index = parse_number(&value).ok_or_else(|| cur.fail("pixel index"))?;
            Ok(Id::Pixel(PixelId::absolute(index)))
        }
        Namespace::PixelLayer => {
            let index = parse_number(&value).ok_or_else(|| cur.fail("pixel layer index"))?;
            Ok(Id::PixelLayer(PixelLayerId { index }))
        }
        Namespace::Animation => Ok(Id::Animation(AnimationId {
            name: strip_quotes(&value).to_string(),
            modifiers: Vec::new(),
        })),
        _ => {
            let kind = hid_kind(ns).ok_or_else(|| cur.fail("identifier"))?;
            Ok(Id::Hid(resolve_hid(cur, kind, &value)?))
        }
    }
}

/// One element of a bracketed code list: a code, a symbolic name, or a
/// span between the two. Returns the covered part plus the single
/// resolved id when the element is a lone code (to keep symbols).
fn bracket_part(cur: &mut Cursor, kind: RangeKind) -> PResult<(RangePart, Option<Id>)> {
    let code_atom = |cur: &mut Cursor| -> PResult<(u32, Option<Id>)> {
        match cur.peek_kind() {
            Some(TokenKind::Number) => {
                let token = cur.next().unwrap();
                let code = parse_number(&token.text).ok_or_else(|| cur.fail("code"))?;
                let id = match kind {
                    RangeKind::ScanCode => Some(Id::ScanCode(ScanCodeId::new(code as u16))),
                    RangeKind::Hid(hid) => Some(Id::Hid(resolve_hid(cur, hid, &token.text)?)),
                    RangeKind::Layer(mode) => Some(Id::Layer(LayerId { mode, index: code })),
                };
                Ok((code, id))
            }
            Some(TokenKind::String) => {
                let RangeKind::Hid(hid) = kind else {
                    return Err(cur.fail("numeric code"));
                };
                let token = cur.next().unwrap();
                let id = resolve_hid(cur, hid, &token.text)?;
                Ok((u32::from(id.code), Some(Id::Hid(id))))
            }
            _ => Err(cur.fail("code or usage name")),
        }
    };

    let (start, start_id) = code_atom(cur)?;
    if cur.eat(TokenKind::Dash) {
        let (end, _) = code_atom(cur)?;
        Ok((RangePart::Span(start, end), None))
    } else {
        Ok((RangePart::Single(start), start_id))
    }
}

/// Bracketed list after a namespace opener: `0x43-0x50`, `"1"-"5"`,
/// `1,3,5`, possibly with a per-element schedule on a lone element.
/// Closed by `]`, then an optional outer schedule.
fn bracketed_elem(cur: &mut Cursor, kind: RangeKind) -> PResult<ComboElem> {
    let mut parts = Vec::new();
    let mut single: Option<Id> = None;
    let mut inner_schedule: Option<Schedule> = None;

    loop {
        let (part, id) = bracket_part(cur, kind)?;
        single = if parts.is_empty() { id } else { None };
        parts.push(part);

        // A schedule directly on a list element is only meaningful for
        // a lone element, where it is equivalent to the unbracketed form
        if cur.peek_kind() == Some(TokenKind::ParenOpen) {
            if parts.len() > 1 {
                return Err(cur.fail("']' (schedules inside multi-element lists)"));
            }
            inner_schedule = Some(schedule_list(cur)?);
        }

        if cur.eat(TokenKind::Comma) {
            continue;
        }
        cur.expect(TokenKind::BracketClose, "']' or ','")?;
        break;
    }

    let outer_schedule = opt_schedule(cur);
    let schedule = inner_schedule.or(outer_schedule);

    // S[0x43] and S0x43 must canonicalize identically
    if parts.len() == 1 {
        if let Some(id) = single {
            return Ok(ComboElem::Id(ScheduledId { id, schedule }));
        }
    }

    Ok(ComboElem::Range(IdRange {
        kind,
        parts,
        schedule,
    }))
}

/// Capability invocation in a result position: `name(arg, …)`.
fn capability_call(cur: &mut Cursor) -> PResult<CapabilityCall> {
    let name = cur.expect(TokenKind::Name, "capability name")?.text.clone();
    cur.expect(TokenKind::ParenOpen, "'('")?;
    let mut args = Vec::new();
    if !cur.eat(TokenKind::ParenClose) {
        loop {
            let arg = match cur.peek_kind() {
                Some(TokenKind::Dash) => {
                    cur.next();
                    let token = cur.expect(TokenKind::Number, "number")?;
                    let value = parse_number(&token.text).ok_or_else(|| cur.fail("number"))?;
                    CapabilityArg::Int(-i64::from(value))
                }
                Some(TokenKind::Number) => {
                    let token = cur.next().unwrap();
                    let value = parse_number(&token.text).ok_or_else(|| cur.fail("number"))?;
                    CapabilityArg::Int(i64::from(value))
                }
                Some(TokenKind::String) => {
                    let token = cur.next().unwrap();
                    CapabilityArg::Str(strip_quotes(&token.text).to_string())
                }
                Some(TokenKind::Name) => {
                    let token = cur.next().unwrap();
                    CapabilityArg::Str(token.text.clone())
                }
                _ => return Err(cur.fail("capability argument")),
            };
            args.push(arg);
            if cur.eat(TokenKind::Comma) {
                continue;
            }
            cur.expect(TokenKind::ParenClose, "')' or ','")?;
            break;
        }
    }
    Ok(CapabilityCall { name, args })
}

/// Animation modifier list: `name`, `name:value`, `name:fn(args)`.
fn animation_modifiers(cur: &mut Cursor) -> PResult<Vec<AnimationModifier>> {
    let mut modifiers = Vec::new();
    loop {
        let name = cur.expect(TokenKind::Name, "modifier name")?.text.clone();
        let arg = if cur.eat(TokenKind::Colon) {
            match cur.peek_kind() {
                Some(TokenKind::Number) => {
                    let token = cur.next().unwrap();
                    let value = parse_number(&token.text).ok_or_else(|| cur.fail("number"))?;
                    Some(ModifierArg::Number(i64::from(value)))
                }
                Some(TokenKind::Name) => {
                    let value = cur.next().unwrap().text.clone();
                    if cur.eat(TokenKind::ParenOpen) {
                        let mut call_args = Vec::new();
                        if !cur.eat(TokenKind::ParenClose) {
                            loop {
                                let token = cur.expect(TokenKind::Number, "number")?;
                                let number =
                                    parse_number(&token.text).ok_or_else(|| cur.fail("number"))?;
                                call_args.push(i64::from(number));
                                if cur.eat(TokenKind::Comma) {
                                    continue;
                                }
                                cur.expect(TokenKind::ParenClose, "')' or ','")?;
                                break;
                            }
                        }
                        Some(ModifierArg::Call(value, call_args))
                    } else {
                        Some(ModifierArg::Name(value))
                    }
                }
                _ => return Err(cur.fail("modifier value")),
            }
        } else {
            None
        };
        modifiers.push(AnimationModifier { name, arg });
        if cur.eat(TokenKind::Comma) {
            continue;
        }
        break;
    }
    Ok(modifiers)
}

/// Animation reference `A[name]` with an optional modifier or schedule
/// suffix depending on position.
fn animation_ref(cur: &mut Cursor, in_result: bool) -> PResult<ComboElem> {
    cur.expect(
        TokenKind::NamespaceOpen(Namespace::Animation),
        "animation reference",
    )?;
    let name = cur.expect(TokenKind::Name, "animation name")?.text.clone();
    cur.expect(TokenKind::BracketClose, "']'")?;

    if in_result {
        // Parens after a result animation are playback modifiers
        let modifiers = if cur.peek_kind() == Some(TokenKind::ParenOpen) {
            cur.next();
            let mods = animation_modifiers(cur)?;
            cur.expect(TokenKind::ParenClose, "')'")?;
            mods
        } else {
            Vec::new()
        };
        Ok(ComboElem::Id(ScheduledId::bare(Id::Animation(
            AnimationId { name, modifiers },
        ))))
    } else {
        // Parens after a trigger animation are a schedule
        let schedule = opt_schedule(cur);
        Ok(ComboElem::Id(ScheduledId {
            id: Id::Animation(AnimationId {
                name,
                modifiers: Vec::new(),
            }),
            schedule,
        }))
    }
}

/// One element of a combo.
fn combo_elem(cur: &mut Cursor, in_result: bool) -> PResult<ComboElem> {
    match cur.peek_kind() {
        Some(TokenKind::Namespaced(Namespace::Animation)) => {
            let id = namespaced_id(cur)?;
            Ok(ComboElem::Id(ScheduledId::bare(id)))
        }
        Some(TokenKind::Namespaced(_)) => {
            let id = namespaced_id(cur)?;
            let schedule = opt_schedule(cur);
            Ok(ComboElem::Id(ScheduledId { id, schedule }))
        }
        Some(TokenKind::NamespaceOpen(Namespace::Animation)) => animation_ref(cur, in_result),
        Some(TokenKind::NamespaceOpen(Namespace::Trigger)) => {
            cur.next();
            let group = cur.expect(TokenKind::Number, "trigger group")?;
            let group = parse_number(&group.text).ok_or_else(|| cur.fail("trigger group"))?;
            cur.expect(TokenKind::Comma, "','")?;
            let index = cur.expect(TokenKind::Number, "trigger index")?;
            let index = parse_number(&index.text).ok_or_else(|| cur.fail("trigger index"))?;
            cur.expect(TokenKind::BracketClose, "']'")?;
            let schedule = opt_schedule(cur);
            Ok(ComboElem::Id(ScheduledId {
                id: Id::GenericTrigger(GenericTriggerId {
                    group: group as u16,
                    index: index as u16,
                }),
                schedule,
            }))
        }
        Some(TokenKind::NamespaceOpen(ns)) => {
            let kind = match ns {
                Namespace::ScanCode => RangeKind::ScanCode,
                Namespace::Layer(mode) => RangeKind::Layer(mode),
                Namespace::Pixel | Namespace::PixelLayer => {
                    // Bare pixel references are only meaningful in results
                    if !in_result {
                        return Err(cur.fail("trigger identifier"));
                    }
                    cur.next();
                    let token = cur.expect(TokenKind::Number, "index")?;
                    let index = parse_number(&token.text).ok_or_else(|| cur.fail("index"))?;
                    cur.expect(TokenKind::BracketClose, "']'")?;
                    let id = if ns == Namespace::Pixel {
                        Id::Pixel(PixelId::absolute(index))
                    } else {
                        Id::PixelLayer(PixelLayerId { index })
                    };
                    return Ok(ComboElem::Id(ScheduledId::bare(id)));
                }
                other => hid_kind(other)
                    .map(RangeKind::Hid)
                    .ok_or_else(|| cur.fail("identifier"))?,
            };
            cur.next();
            bracketed_elem(cur, kind)
        }
        Some(TokenKind::CodePoint) => {
            let token = cur.next().unwrap();
            let point = u32::from_str_radix(&token.text[2..], 16)
                .map_err(|_| cur.fail("code point"))?;
            let schedule = opt_schedule(cur);
            Ok(ComboElem::Id(ScheduledId {
                id: Id::Unicode { point },
                schedule,
            }))
        }
        Some(TokenKind::CharString) => {
            let token = cur.next().unwrap();
            Ok(ComboElem::Id(ScheduledId::bare(Id::Text {
                text: strip_quotes(&token.text).to_string(),
            })))
        }
        Some(TokenKind::UString) => {
            let token = cur.next().unwrap();
            Ok(ComboElem::Id(ScheduledId::bare(Id::Text {
                text: strip_quotes(&token.text[1..]).to_string(),
            })))
        }
        Some(TokenKind::Name) if in_result => {
            let token = cur.peek().unwrap();
            if token.text == "None" {
                cur.next();
                Ok(ComboElem::Id(ScheduledId::bare(Id::None)))
            } else {
                let call = capability_call(cur)?;
                Ok(ComboElem::Id(ScheduledId::bare(Id::Capability(call))))
            }
        }
        _ => Err(cur.fail(if in_result {
            "result identifier"
        } else {
            "trigger identifier"
        })),
    }
}

/// `elem (+ elem)*`
fn combo(cur: &mut Cursor, in_result: bool) -> PResult<Combo> {
    let mut elems = vec![combo_elem(cur, in_result)?];
    while cur.eat(TokenKind::Plus) {
        elems.push(combo_elem(cur, in_result)?);
    }
    Ok(Combo { elems })
}

/// `combo (, combo)*`; a trailing comma is an error, not a silent
/// accept.
fn sequence(cur: &mut Cursor, in_result: bool) -> PResult<Sequence> {
    let mut combos = vec![combo(cur, in_result)?];
    while cur.eat(TokenKind::Comma) {
        if cur.at_end() || map_operator_kind(cur.peek_kind()).is_some() {
            return Err(cur.fail("combo after ','"));
        }
        combos.push(combo(cur, in_result)?);
    }
    Ok(Sequence { combos })
}

fn map_operator_kind(kind: Option<TokenKind>) -> Option<MapOperator> {
    match kind? {
        TokenKind::Colon => Some(MapOperator::new(OpKind::Assign)),
        TokenKind::ColonPlus => Some(MapOperator::new(OpKind::Append)),
        TokenKind::ColonMinus => Some(MapOperator::new(OpKind::Remove)),
        TokenKind::ColonColon => Some(MapOperator::new(OpKind::Isolate)),
        TokenKind::Equals => Some(MapOperator::new(OpKind::Replace)),
        TokenKind::IndColon => Some(MapOperator::indicator(OpKind::Assign)),
        TokenKind::IndColonPlus => Some(MapOperator::indicator(OpKind::Append)),
        TokenKind::IndColonMinus => Some(MapOperator::indicator(OpKind::Remove)),
        TokenKind::IndColonColon => Some(MapOperator::indicator(OpKind::Isolate)),
        _ => None,
    }
}

/// `triggerSeq OP resultSeq`
fn mapping(cur: &mut Cursor) -> PResult<ExpressionKind> {
    let trigger = sequence(cur, false)?;
    let operator = map_operator_kind(cur.peek_kind())
        .ok_or_else(|| cur.fail("mapping operator (':', ':+', ':-', '::', '=')"))?;
    cur.next();
    let result = sequence(cur, true)?;
    if !cur.at_end() {
        return Err(cur.fail("end of statement"));
    }
    Ok(ExpressionKind::Mapping(MappingExpr {
        trigger,
        operator,
        result,
    }))
}

// === Assignments and name associations ===

/// Remaining tokens of a scalar value, joined as written.
fn value_text(cur: &mut Cursor) -> String {
    let mut parts = Vec::new();
    while let Some(token) = cur.next() {
        parts.push(token.text.clone());
    }
    parts.join(" ")
}

/// Comma-separated value list for whole-array assignment.
fn value_list(cur: &mut Cursor) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = Vec::new();
    while let Some(token) = cur.next() {
        if token.kind == TokenKind::Comma {
            values.push(current.join(" "));
            current = Vec::new();
        } else {
            current.push(token.text.clone());
        }
    }
    if !current.is_empty() {
        values.push(current.join(" "));
    }
    values
}

fn assignment(cur: &mut Cursor) -> PResult<ExpressionKind> {
    let name = cur.expect(TokenKind::Name, "variable name")?.text.clone();

    if cur.eat(TokenKind::BracketOpen) {
        let index = if cur.peek_kind() == Some(TokenKind::Number) {
            let token = cur.next().unwrap();
            Some(parse_number(&token.text).ok_or_else(|| cur.fail("array index"))? as usize)
        } else {
            None
        };
        cur.expect(TokenKind::BracketClose, "']'")?;
        cur.expect(TokenKind::Equals, "'='")?;

        match index {
            Some(index) => Ok(ExpressionKind::Assignment(AssignmentExpr::ArrayElement {
                name,
                index,
                value: value_text(cur),
            })),
            None => Ok(ExpressionKind::Assignment(AssignmentExpr::ArrayWhole {
                name,
                values: value_list(cur),
            })),
        }
    } else {
        cur.expect(TokenKind::Equals, "'='")?;
        Ok(ExpressionKind::Assignment(AssignmentExpr::Scalar {
            name,
            value: value_text(cur),
        }))
    }
}

/// `name => cSymbol(arg:width, …);` or `name => C_Define;`
fn name_association(cur: &mut Cursor) -> PResult<ExpressionKind> {
    let name = cur.expect(TokenKind::Name, "name")?.text.clone();
    cur.expect(TokenKind::ArrowRight, "'=>'")?;
    let symbol = cur.expect(TokenKind::Name, "C identifier")?.text.clone();

    if cur.eat(TokenKind::ParenOpen) {
        let mut args = Vec::new();
        if !cur.eat(TokenKind::ParenClose) {
            loop {
                let arg_name = cur.expect(TokenKind::Name, "argument name")?.text.clone();
                cur.expect(TokenKind::Colon, "':'")?;
                let width = cur.expect(TokenKind::Number, "argument width")?;
                let width = parse_number(&width.text).ok_or_else(|| cur.fail("width"))?;
                args.push(CapabilityArgDecl {
                    name: arg_name,
                    width: width as u8,
                });
                if cur.eat(TokenKind::Comma) {
                    continue;
                }
                cur.expect(TokenKind::ParenClose, "')' or ','")?;
                break;
            }
        }
        if !cur.at_end() {
            return Err(cur.fail("end of statement"));
        }
        Ok(ExpressionKind::Capability(CapabilityExpr {
            name,
            symbol,
            args,
        }))
    } else {
        if !cur.at_end() {
            return Err(cur.fail("end of statement"));
        }
        Ok(ExpressionKind::Define(DefineExpr { name, symbol }))
    }
}

// === Data associations ===

/// `x:20, y:-15.5, …`
fn position_list(cur: &mut Cursor) -> PResult<PhysicalPosition> {
    let mut position = PhysicalPosition::new();
    loop {
        let axis = cur.expect(TokenKind::Name, "axis (x,y,z,rx,ry,rz)")?.text.clone();

        // `x:-5` tokenizes the ':-' as a remove operator; accept both
        let negative = match cur.peek_kind() {
            Some(TokenKind::Colon) => {
                cur.next();
                cur.eat(TokenKind::Dash)
            }
            Some(TokenKind::ColonMinus) => {
                cur.next();
                true
            }
            _ => return Err(cur.fail("':'")),
        };

        let token = cur.expect(TokenKind::Number, "axis value")?;
        let value: f64 = token
            .text
            .parse()
            .map_err(|_| cur.fail("decimal axis value"))?;
        let value = if negative { -value } else { value };

        if !position.set_axis(&axis, value) {
            return Err(cur.semantic_fail("axis (x,y,z,rx,ry,rz)"));
        }

        if cur.eat(TokenKind::Comma) {
            continue;
        }
        break;
    }
    if !cur.at_end() {
        return Err(cur.fail("end of statement"));
    }
    Ok(position)
}

/// `S0x40 <= x:20, y:15;`
fn scancode_position(cur: &mut Cursor) -> PResult<ExpressionKind> {
    let token = cur.expect(
        TokenKind::Namespaced(Namespace::ScanCode),
        "scan code",
    )?;
    let code = parse_number(token.ns_value()).ok_or_else(|| cur.fail("scan code"))?;
    cur.expect(TokenKind::ArrowLeft, "'<='")?;
    let position = position_list(cur)?;
    Ok(ExpressionKind::ScanCodePosition(ScanCodePositionExpr {
        scancode: code as u16,
        position,
    }))
}

/// Pixel index written `P[12]` or `P12`.
fn pixel_index(cur: &mut Cursor) -> PResult<u32> {
    match cur.peek_kind() {
        Some(TokenKind::Namespaced(Namespace::Pixel)) => {
            let token = cur.next().unwrap();
            parse_number(token.ns_value()).ok_or_else(|| cur.fail("pixel index"))
        }
        Some(TokenKind::NamespaceOpen(Namespace::Pixel)) => {
            cur.next();
            let token = cur.expect(TokenKind::Number, "pixel index")?;
            let index = parse_number(&token.text).ok_or_else(|| cur.fail("pixel index"))?;
            cur.expect(TokenKind::BracketClose, "']'")?;
            Ok(index)
        }
        _ => Err(cur.fail("pixel")),
    }
}

/// `P[12] <= x:20, y:15;`
fn pixel_position(cur: &mut Cursor) -> PResult<ExpressionKind> {
    let index = pixel_index(cur)?;
    cur.expect(TokenKind::ArrowLeft, "'<='")?;
    let position = position_list(cur)?;
    Ok(ExpressionKind::PixelPosition(PixelPositionExpr {
        index,
        position,
    }))
}

/// `P[5](30:8, 31:8) : S0x42;` — pixel channel composition.
fn pixel_channels(cur: &mut Cursor) -> PResult<ExpressionKind> {
    let index = pixel_index(cur)?;

    cur.expect(TokenKind::ParenOpen, "'('")?;
    let mut channels = Vec::new();
    if !cur.eat(TokenKind::ParenClose) {
        loop {
            let channel = cur.expect(TokenKind::Number, "channel")?;
            let channel = parse_number(&channel.text).ok_or_else(|| cur.fail("channel"))?;
            cur.expect(TokenKind::Colon, "':'")?;
            let width = cur.expect(TokenKind::Number, "width")?;
            let width = parse_number(&width.text).ok_or_else(|| cur.fail("width"))?;
            channels.push(PixelChannel {
                channel: channel as u16,
                width: width as u8,
            });
            if cur.eat(TokenKind::Comma) {
                continue;
            }
            cur.expect(TokenKind::ParenClose, "')' or ','")?;
            break;
        }
    }

    cur.expect(TokenKind::Colon, "':'")?;
    let scancode = match cur.peek() {
        Some(token) if token.kind == TokenKind::Namespaced(Namespace::ScanCode) => {
            let code = parse_number(token.ns_value()).ok_or_else(|| cur.fail("scan code"))?;
            cur.next();
            Some(code as u16)
        }
        Some(token) if token.kind == TokenKind::Name && token.text == "None" => {
            cur.next();
            None
        }
        _ => return Err(cur.fail("scan code or None")),
    };
    if !cur.at_end() {
        return Err(cur.fail("end of statement"));
    }

    Ok(ExpressionKind::PixelChannels(PixelChannelsExpr {
        pixel: PixelId {
            index: index as i32,
            channels,
            address_mode: PixelAddressMode::Absolute,
        },
        scancode,
    }))
}

// === Animations ===

/// Frame target in an animation frame: pixel (absolute or relative),
/// pixel layer, scan code, or HID id.
fn frame_target(cur: &mut Cursor) -> PResult<Id> {
    match cur.peek_kind() {
        Some(TokenKind::Namespaced(_)) => namespaced_id(cur),
        Some(TokenKind::NamespaceOpen(Namespace::Pixel)) => {
            cur.next();
            let (negative, relative) = match cur.peek_kind() {
                Some(TokenKind::Plus) => {
                    cur.next();
                    (false, true)
                }
                Some(TokenKind::Dash) => {
                    cur.next();
                    (true, true)
                }
                _ => (false, false),
            };
            let token = cur.expect(TokenKind::Number, "pixel index")?;
            let index = parse_number(&token.text).ok_or_else(|| cur.fail("pixel index"))?;
            cur.expect(TokenKind::BracketClose, "']'")?;
            let index = if negative { -(index as i32) } else { index as i32 };
            Ok(Id::Pixel(PixelId {
                index,
                channels: Vec::new(),
                address_mode: if relative {
                    PixelAddressMode::RelativeSigned
                } else {
                    PixelAddressMode::Absolute
                },
            }))
        }
        Some(TokenKind::NamespaceOpen(Namespace::PixelLayer)) => {
            cur.next();
            let token = cur.expect(TokenKind::Number, "pixel layer index")?;
            let index = parse_number(&token.text).ok_or_else(|| cur.fail("index"))?;
            cur.expect(TokenKind::BracketClose, "']'")?;
            Ok(Id::PixelLayer(PixelLayerId { index }))
        }
        _ => Err(cur.fail("frame target")),
    }
}

/// `target(v, +v, -v)` channel operations.
fn pixel_mod(cur: &mut Cursor) -> PResult<PixelModExpr> {
    let target = frame_target(cur)?;
    cur.expect(TokenKind::ParenOpen, "'('")?;
    let mut mods = Vec::new();
    if !cur.eat(TokenKind::ParenClose) {
        loop {
            let op = match cur.peek_kind() {
                Some(TokenKind::Plus) => {
                    cur.next();
                    PixelModOp::Add
                }
                Some(TokenKind::Dash) => {
                    cur.next();
                    PixelModOp::Subtract
                }
                _ => PixelModOp::Set,
            };
            let token = cur.expect(TokenKind::Number, "channel value")?;
            let value = parse_number(&token.text).ok_or_else(|| cur.fail("channel value"))?;
            mods.push(PixelMod {
                op,
                value: i64::from(value),
            });
            if cur.eat(TokenKind::Comma) {
                continue;
            }
            cur.expect(TokenKind::ParenClose, "')' or ','")?;
            break;
        }
    }
    Ok(PixelModExpr { target, mods })
}

/// `A[name] <= modifiers;` or `A[name, frames] <= pixel values;`
fn animation_statement(cur: &mut Cursor) -> PResult<ExpressionKind> {
    cur.expect(
        TokenKind::NamespaceOpen(Namespace::Animation),
        "animation",
    )?;
    let name = cur.expect(TokenKind::Name, "animation name")?.text.clone();

    if cur.eat(TokenKind::Comma) {
        // Frame definition
        let mut frames = Vec::new();
        loop {
            let token = cur.expect(TokenKind::Number, "frame index")?;
            let start = parse_number(&token.text).ok_or_else(|| cur.fail("frame index"))?;
            if cur.eat(TokenKind::Dash) {
                let token = cur.expect(TokenKind::Number, "frame index")?;
                let end = parse_number(&token.text).ok_or_else(|| cur.fail("frame index"))?;
                let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
                frames.extend(lo..=hi);
            } else {
                frames.push(start);
            }
            if cur.eat(TokenKind::Comma) {
                continue;
            }
            cur.expect(TokenKind::BracketClose, "']' or ','")?;
            break;
        }
        cur.expect(TokenKind::ArrowLeft, "'<='")?;

        let mut values = Vec::new();
        loop {
            values.push(pixel_mod(cur)?);
            if cur.eat(TokenKind::Comma) {
                continue;
            }
            break;
        }
        if !cur.at_end() {
            return Err(cur.fail("end of statement"));
        }
        Ok(ExpressionKind::AnimationFrame(AnimationFrameExpr {
            name,
            frames,
            values,
        }))
    } else {
        cur.expect(TokenKind::BracketClose, "']'")?;
        cur.expect(TokenKind::ArrowLeft, "'<='")?;
        let modifiers = animation_modifiers(cur)?;
        if !cur.at_end() {
            return Err(cur.fail("end of statement"));
        }
        Ok(ExpressionKind::AnimationDef(AnimationDefExpr {
            name,
            modifiers,
        }))
    }
}

// === Statement dispatch ===

fn contains_kind(tokens: &[Token], kind: TokenKind) -> bool {
    tokens.iter().any(|t| t.kind == kind)
}

fn parse_statement(cur: &mut Cursor, statement: &[Token]) -> PResult<ExpressionKind> {
    match cur.peek_kind() {
        Some(TokenKind::Name) => match statement.get(1).map(|t| t.kind) {
            Some(TokenKind::ArrowRight) => name_association(cur),
            Some(TokenKind::Equals | TokenKind::BracketOpen) => assignment(cur),
            _ => Err(cur.fail("'=', '[' or '=>'")),
        },
        Some(
            TokenKind::Namespaced(Namespace::Pixel) | TokenKind::NamespaceOpen(Namespace::Pixel),
        ) => cur.alt(&[&pixel_position, &pixel_channels]),
        Some(TokenKind::Namespaced(Namespace::ScanCode))
            if contains_kind(statement, TokenKind::ArrowLeft) =>
        {
            scancode_position(cur)
        }
        Some(TokenKind::NamespaceOpen(Namespace::Animation))
            if contains_kind(statement, TokenKind::ArrowLeft) =>
        {
            animation_statement(cur)
        }
        Some(_) => mapping(cur),
        None => Err(cur.fail("statement")),
    }
}

// === Post-parse validation ===

fn check_schedule(
    schedule: Option<&Schedule>,
    id: &Id,
    origin: &Origin,
    diagnostics: &mut Diagnostics,
) {
    let Some(schedule) = schedule else { return };

    if let Err(message) = schedule.validate() {
        diagnostics.push(
            Diagnostic::error(DiagnosticKind::Semantic, message).at(&origin.file, origin.line, 1),
        );
    }

    // Analog values only make sense on key-like identifiers
    let analog = schedule
        .params
        .iter()
        .any(|p| matches!(p, ScheduleParam::Analog { .. }));
    let key_like = matches!(id, Id::ScanCode(_) | Id::GenericTrigger(_))
        || matches!(id, Id::Hid(hid) if hid.kind == HidKind::Keyboard);
    if analog && !key_like {
        diagnostics.push(
            Diagnostic::warning(
                DiagnosticKind::Semantic,
                format!("analog schedule value on non-analog identifier {id}"),
            )
            .at(&origin.file, origin.line, 1),
        );
    }
}

fn check_sequence(sequence: &Sequence, origin: &Origin, diagnostics: &mut Diagnostics) {
    for combo in &sequence.combos {
        for elem in &combo.elems {
            match elem {
                ComboElem::Id(scheduled) => {
                    if let Err(message) = scheduled.id.validate() {
                        diagnostics.push(
                            Diagnostic::error(DiagnosticKind::Semantic, message).at(
                                &origin.file,
                                origin.line,
                                1,
                            ),
                        );
                    }
                    check_schedule(scheduled.schedule.as_ref(), &scheduled.id, origin, diagnostics);
                }
                ComboElem::Range(range) => {
                    if let Some(schedule) = &range.schedule {
                        if let Err(message) = schedule.validate() {
                            diagnostics.push(
                                Diagnostic::error(DiagnosticKind::Semantic, message).at(
                                    &origin.file,
                                    origin.line,
                                    1,
                                ),
                            );
                        }
                    }
                    // Range bounds obey the same limits as single ids
                    let limit = match range.kind {
                        RangeKind::Hid(kind) => Some((u32::from(kind.max_code()), kind.prefix())),
                        RangeKind::ScanCode => {
                            Some((u32::from(crate::constants::MAX_SCAN_CODE), "S"))
                        }
                        RangeKind::Layer(_) => None,
                    };
                    if let Some((max_code, prefix)) = limit {
                        for code in range.codes() {
                            if code > max_code {
                                diagnostics.push(
                                    Diagnostic::error(
                                        DiagnosticKind::Semantic,
                                        format!(
                                            "range code 0x{code:X} exceeds the {prefix} maximum \
                                             0x{max_code:X}"
                                        ),
                                    )
                                    .at(&origin.file, origin.line, 1),
                                );
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}

fn validate_expression(expression: &Expression, diagnostics: &mut Diagnostics) {
    if let ExpressionKind::Mapping(mapping) = &expression.kind {
        check_sequence(&mapping.trigger, &expression.origin, diagnostics);
        check_sequence(&mapping.result, &expression.origin, diagnostics);
    }
}

/// Parses a token stream into expressions, reporting failures into
/// `diagnostics` and resynchronizing at the next `;`.
pub fn parse_tokens(file: &str, tokens: &[Token], diagnostics: &mut Diagnostics) -> Vec<Expression> {
    let hid = HidDb::new();
    let mut expressions = Vec::new();

    let mut start = 0usize;
    let mut pos = 0usize;
    while pos <= tokens.len() {
        let at_semi = tokens.get(pos).is_some_and(|t| t.kind == TokenKind::Semi);
        let at_eof = pos == tokens.len();
        if !at_semi && !at_eof {
            pos += 1;
            continue;
        }

        let statement = &tokens[start..pos];
        if !statement.is_empty() {
            if at_eof {
                let last = &tokens[pos - 1];
                diagnostics.push(
                    Diagnostic::error(DiagnosticKind::Parse, "expected ';'").at(
                        file,
                        last.line,
                        last.col + last.text.len() as u32,
                    ),
                );
            } else {
                let origin = Origin::new(file, statement[0].line);
                let mut cursor = Cursor::new(statement, &hid);
                match parse_statement(&mut cursor, statement) {
                    Ok(kind) => {
                        let expression = Expression { origin, kind };
                        validate_expression(&expression, diagnostics);
                        expressions.push(expression);
                    }
                    Err(fail) => diagnostics.push(fail.diagnostic(file)),
                }
            }
        }

        pos += 1;
        start = pos;
    }

    expressions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokenize;

    fn parse_ok(text: &str) -> Vec<Expression> {
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize("test.kll", text).unwrap();
        let expressions = parse_tokens("test.kll", &tokens, &mut diagnostics);
        assert!(
            !diagnostics.has_errors(),
            "unexpected errors: {diagnostics}"
        );
        expressions
    }

    fn parse_with_diags(text: &str) -> (Vec<Expression>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize("test.kll", text).unwrap();
        let expressions = parse_tokens("test.kll", &tokens, &mut diagnostics);
        (expressions, diagnostics)
    }

    #[test]
    fn test_simple_mapping() {
        let expressions = parse_ok("U\"A\" : U\"B\";");
        assert_eq!(expressions.len(), 1);
        assert_eq!(expressions[0].to_string(), "U\"A\" : U\"B\";");
    }

    #[test]
    fn test_mapping_operators() {
        for (source, expected) in [
            ("U\"A\" :+ U\"C\";", "U\"A\" :+ U\"C\";"),
            ("U\"A\" :- U\"C\";", "U\"A\" :- U\"C\";"),
            ("U\"A\" :: U\"Z\";", "U\"A\" :: U\"Z\";"),
            ("U\"A\" = U\"Q\";", "U\"A\" = U\"Q\";"),
            ("I\"NumLock\" i: U\"Q\";", "I\"NumLock\" i: U\"Q\";"),
        ] {
            let expressions = parse_ok(source);
            assert_eq!(expressions[0].to_string(), expected, "for {source}");
        }
    }

    #[test]
    fn test_combo_and_sequence() {
        let expressions = parse_ok("S0x10 + S0x11, S0x12 : U\"X\";");
        let ExpressionKind::Mapping(mapping) = &expressions[0].kind else {
            panic!("expected mapping");
        };
        assert_eq!(mapping.trigger.combos.len(), 2);
        assert_eq!(mapping.trigger.combos[0].elems.len(), 2);
    }

    #[test]
    fn test_trailing_comma_is_error() {
        let (_, diagnostics) = parse_with_diags("S0x10, : U\"X\";");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn test_scheduled_forms_canonicalize_identically() {
        let plain = parse_ok("S0x43(P,UP,UR) : U\"Enter\";");
        let bracketed = parse_ok("S[0x43(P,UP,UR)] : U\"Enter\";");
        let ExpressionKind::Mapping(a) = &plain[0].kind else {
            panic!()
        };
        let ExpressionKind::Mapping(b) = &bracketed[0].kind else {
            panic!()
        };
        assert_eq!(a.trigger_key(), b.trigger_key());
        assert_eq!(a.trigger_key(), "S0x43(P,UP,UR)");
    }

    #[test]
    fn test_range_stays_symbolic() {
        let expressions = parse_ok("S[0x43-0x50] : U\"X\";");
        let ExpressionKind::Mapping(mapping) = &expressions[0].kind else {
            panic!()
        };
        assert!(mapping.trigger.has_ranges());
        assert_eq!(mapping.trigger.to_string(), "S[0x43-0x50]");
    }

    #[test]
    fn test_hid_string_range() {
        let expressions = parse_ok("U[\"1\"-\"5\"] : U\"X\";");
        let ExpressionKind::Mapping(mapping) = &expressions[0].kind else {
            panic!()
        };
        let ComboElem::Range(range) = &mapping.trigger.combos[0].elems[0] else {
            panic!("expected range");
        };
        assert_eq!(range.parts, vec![RangePart::Span(0x1E, 0x22)]);
    }

    #[test]
    fn test_analog_pulse_schedule() {
        // U"A"(0) is an analog-value schedule, not state O with timing
        let expressions = parse_ok("U\"v\" : U\"A\"(0);");
        let ExpressionKind::Mapping(mapping) = &expressions[0].kind else {
            panic!()
        };
        let ComboElem::Id(scheduled) = &mapping.result.combos[0].elems[0] else {
            panic!()
        };
        let schedule = scheduled.schedule.as_ref().unwrap();
        assert_eq!(schedule.params, vec![ScheduleParam::Analog { value: 0 }]);
    }

    #[test]
    fn test_timing_in_result() {
        let expressions = parse_ok("U\"v\" : U\"a\"(P,H:300ms,R);");
        let ExpressionKind::Mapping(mapping) = &expressions[0].kind else {
            panic!()
        };
        let ComboElem::Id(scheduled) = &mapping.result.combos[0].elems[0] else {
            panic!()
        };
        assert_eq!(scheduled.schedule.as_ref().unwrap().to_string(), "P,H:300ms,R");
    }

    #[test]
    fn test_capability_result() {
        let expressions = parse_ok("S0x30 : fadeLayer(1, -2);");
        assert_eq!(expressions[0].to_string(), "S0x30 : fadeLayer(1,-2);");
    }

    #[test]
    fn test_none_result() {
        let expressions = parse_ok("S0x30 : None;");
        let ExpressionKind::Mapping(mapping) = &expressions[0].kind else {
            panic!()
        };
        assert_eq!(
            mapping.result.combos[0].elems[0],
            ComboElem::Id(ScheduledId::bare(Id::None))
        );
    }

    #[test]
    fn test_layer_trigger_and_result() {
        let expressions = parse_ok("S0x31 : LayerShift[1];");
        assert_eq!(expressions[0].to_string(), "S0x31 : LayerShift[1];");

        let expressions = parse_ok("Layer[2] + S0x10 : U\"A\";");
        assert_eq!(expressions[0].to_string(), "Layer[2] + S0x10 : U\"A\";");
    }

    #[test]
    fn test_generic_trigger() {
        let expressions = parse_ok("T[5, 2](P) : U\"A\";");
        assert_eq!(expressions[0].to_string(), "T[5,2](P) : U\"A\";");
    }

    #[test]
    fn test_assignments() {
        let expressions = parse_ok(
            "MyVar = 42;\nName = \"Board\";\nList[] = a, b, c;\nList[1] = d;",
        );
        assert_eq!(expressions.len(), 4);
        assert_eq!(expressions[0].to_string(), "MyVar = 42;");
        assert_eq!(expressions[1].to_string(), "Name = \"Board\";");
        assert_eq!(expressions[2].to_string(), "List[] = a, b, c;");
        assert_eq!(expressions[3].to_string(), "List[1] = d;");
    }

    #[test]
    fn test_capability_and_define() {
        let expressions = parse_ok("power => usbPower(state:1);\nmyDef => My_C_Define;");
        assert_eq!(expressions[0].to_string(), "power => usbPower(state:1);");
        assert_eq!(expressions[1].to_string(), "myDef => My_C_Define;");
    }

    #[test]
    fn test_positions() {
        let expressions = parse_ok("S0x40 <= x:20, y:-15.5;\nP[12] <= x:1, rz:90;");
        assert_eq!(expressions[0].to_string(), "S0x40 <= x:20,y:-15.5;");
        assert_eq!(expressions[1].to_string(), "P[12] <= x:1,rz:90;");
    }

    #[test]
    fn test_pixel_channels() {
        let expressions = parse_ok("P[5](30:8, 31:8, 32:8) : S0x42;");
        let ExpressionKind::PixelChannels(channels) = &expressions[0].kind else {
            panic!("expected pixel channels, got {:?}", expressions[0].kind);
        };
        assert_eq!(channels.pixel.channels.len(), 3);
        assert_eq!(channels.scancode, Some(0x42));
    }

    #[test]
    fn test_animation_def_and_frame() {
        let expressions = parse_ok(
            "A[Rainbow] <= start, loop:3, pfunc:interp;\nA[Rainbow, 0-1] <= P[1](255,0,0), P[+1](+10,0,0);",
        );
        let ExpressionKind::AnimationDef(def) = &expressions[0].kind else {
            panic!("expected animation def");
        };
        assert_eq!(def.modifiers.len(), 3);

        let ExpressionKind::AnimationFrame(frame) = &expressions[1].kind else {
            panic!("expected animation frame");
        };
        assert_eq!(frame.frames, vec![0, 1]);
        assert_eq!(frame.values.len(), 2);
    }

    #[test]
    fn test_animation_result_with_modifiers() {
        let expressions = parse_ok("S0x33 : A[Rainbow](start);");
        assert_eq!(expressions[0].to_string(), "S0x33 : A[Rainbow](start);");
    }

    #[test]
    fn test_unknown_schedule_state_is_semantic_error() {
        let (_, diagnostics) = parse_with_diags("S0x43(Q) : U\"A\";");
        assert!(diagnostics.has_errors());
        let rendered = diagnostics.to_string();
        assert!(rendered.contains("semantic error"), "got: {rendered}");
    }

    #[test]
    fn test_duplicate_state_is_semantic_error() {
        let (_, diagnostics) = parse_with_diags("S0x43(P,P) : U\"A\";");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn test_hid_code_out_of_range() {
        let (_, diagnostics) = parse_with_diags("U0x100 : U\"A\";");
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn test_error_recovery_continues_past_bad_statement() {
        let (expressions, diagnostics) =
            parse_with_diags("U\"A\" :;\nU\"B\" : U\"C\";\nU\"D\" :;");
        assert_eq!(expressions.len(), 1);
        assert_eq!(diagnostics.error_count(), 2);
    }

    #[test]
    fn test_missing_semicolon_reported() {
        let (_, diagnostics) = parse_with_diags("U\"A\" : U\"B\"");
        assert!(diagnostics.has_errors());
        assert!(diagnostics.to_string().contains("expected ';'"));
    }

    #[test]
    fn test_unicode_and_charstring() {
        let expressions = parse_ok("S0x20 : U+2603;\nS0x21 : 'hello';\nS0x22 : u'héllo';");
        assert_eq!(expressions[0].to_string(), "S0x20 : U+2603;");
        assert_eq!(expressions[1].to_string(), "S0x21 : 'hello';");
    }
}
