//! Typed expression nodes produced by the parser.
//!
//! Expressions are an explicit tagged sum; every consumer matches
//! exhaustively. Mappings cross-reference their triggers through the
//! canonical string form produced by [`MappingExpr::trigger_key`], so
//! the stores never need node identity or graph pointers.

use crate::models::id::{AnimationModifier, HidKind, Id, LayerMode, PixelId};
use crate::models::position::PhysicalPosition;
use crate::models::schedule::Schedule;
use serde::Serialize;
use std::fmt;

/// Source location an expression was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub file: String,
    pub line: u32,
}

impl Origin {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// Base operation of a mapping expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// `:` maps-to
    Assign,
    /// `:+` add to the existing result set
    Append,
    /// `:-` remove from the existing result set
    Remove,
    /// `::` replace and protect from lower-precedence overrides
    Isolate,
    /// `=` replace
    Replace,
}

/// A mapping operator: base operation plus the indicator-map flag
/// (the `i:` family shares operations but lives in its own keyspace).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MapOperator {
    pub kind: OpKind,
    pub indicator: bool,
}

impl MapOperator {
    #[must_use]
    pub const fn new(kind: OpKind) -> Self {
        Self {
            kind,
            indicator: false,
        }
    }

    #[must_use]
    pub const fn indicator(kind: OpKind) -> Self {
        Self {
            kind,
            indicator: true,
        }
    }
}

impl fmt::Display for MapOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.indicator {
            write!(f, "i")?;
        }
        let op = match self.kind {
            OpKind::Assign => ":",
            OpKind::Append => ":+",
            OpKind::Remove => ":-",
            OpKind::Isolate => "::",
            OpKind::Replace => "=",
        };
        write!(f, "{op}")
    }
}

/// An identifier together with its schedule.
///
/// `schedule == None` means any activation; an empty `Some` schedule is
/// the implicit press written as `()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledId {
    pub id: Id,
    pub schedule: Option<Schedule>,
}

impl ScheduledId {
    #[must_use]
    pub const fn bare(id: Id) -> Self {
        Self { id, schedule: None }
    }
}

impl fmt::Display for ScheduledId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if let Some(schedule) = &self.schedule {
            write!(f, "({schedule})")?;
        }
        Ok(())
    }
}

/// Identifier kind of a symbolic range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    ScanCode,
    Hid(HidKind),
    Layer(LayerMode),
}

impl RangeKind {
    /// KLL namespace prefix for the bracketed form.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            RangeKind::ScanCode => "S",
            RangeKind::Hid(kind) => kind.prefix(),
            RangeKind::Layer(mode) => mode.prefix(),
        }
    }

    /// True for kinds whose codes print in hexadecimal.
    #[must_use]
    pub const fn hex_codes(self) -> bool {
        matches!(self, RangeKind::ScanCode | RangeKind::Hid(_))
    }
}

/// One element of a bracketed list: a single code or a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RangePart {
    Single(u32),
    Span(u32, u32),
}

impl RangePart {
    /// Enumerates the codes this part covers, low to high.
    pub fn codes(self) -> impl Iterator<Item = u32> {
        match self {
            RangePart::Single(code) => code..=code,
            RangePart::Span(start, end) => {
                let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
                lo..=hi
            }
        }
    }
}

/// A symbolic id range (`S[0x43-0x50]`, `U["1"-"5"]`, `Layer[1-3]`).
///
/// Ranges stay symbolic through merge so overrides can target the
/// symbolic form; they expand only during finalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdRange {
    pub kind: RangeKind,
    pub parts: Vec<RangePart>,
    pub schedule: Option<Schedule>,
}

impl IdRange {
    /// Enumerates every code the range covers, in listed order.
    pub fn codes(&self) -> impl Iterator<Item = u32> + '_ {
        self.parts.iter().flat_map(|part| part.codes())
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = |c: u32| -> String {
            if self.kind.hex_codes() {
                format!("0x{c:02X}")
            } else {
                format!("{c}")
            }
        };

        write!(f, "{}[", self.kind.prefix())?;
        for (idx, part) in self.parts.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            match part {
                RangePart::Single(c) => write!(f, "{}", code(*c))?,
                RangePart::Span(start, end) => write!(f, "{}-{}", code(*start), code(*end))?,
            }
        }
        write!(f, "]")?;
        if let Some(schedule) = &self.schedule {
            write!(f, "({schedule})")?;
        }
        Ok(())
    }
}

/// Element of a combo: a concrete id or a symbolic range.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ComboElem {
    Id(ScheduledId),
    Range(IdRange),
}

impl fmt::Display for ComboElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComboElem::Id(id) => write!(f, "{id}"),
            ComboElem::Range(range) => write!(f, "{range}"),
        }
    }
}

/// A set of ids held simultaneously, joined by `+`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Combo {
    pub elems: Vec<ComboElem>,
}

impl fmt::Display for Combo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, elem) in self.elems.iter().enumerate() {
            if idx > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{elem}")?;
        }
        Ok(())
    }
}

/// Combos in order, joined by `,`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Sequence {
    pub combos: Vec<Combo>,
}

impl Sequence {
    /// Sequence holding a single bare id.
    #[must_use]
    pub fn single(id: Id) -> Self {
        Self {
            combos: vec![Combo {
                elems: vec![ComboElem::Id(ScheduledId::bare(id))],
            }],
        }
    }

    /// Scan code of the first id of the first combo, when there is
    /// one. Symbolic ranges have no single leading code; they are
    /// consulted only after expansion.
    #[must_use]
    pub fn leading_scan_code(&self) -> Option<u16> {
        match self.combos.first()?.elems.first()? {
            ComboElem::Id(scheduled) => scheduled.id.as_scan_code(),
            ComboElem::Range(_) => None,
        }
    }

    /// True when any combo contains a symbolic range.
    #[must_use]
    pub fn has_ranges(&self) -> bool {
        self.combos
            .iter()
            .any(|combo| combo.elems.iter().any(|e| matches!(e, ComboElem::Range(_))))
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, combo) in self.combos.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{combo}")?;
        }
        Ok(())
    }
}

/// Variable assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "assignment", rename_all = "snake_case")]
pub enum AssignmentExpr {
    /// `name = value;`
    Scalar { name: String, value: String },
    /// `name[i] = value;`
    ArrayElement {
        name: String,
        index: usize,
        value: String,
    },
    /// `name[] = v1, v2, …;`
    ArrayWhole { name: String, values: Vec<String> },
}

impl AssignmentExpr {
    /// Variable name being assigned.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            AssignmentExpr::Scalar { name, .. }
            | AssignmentExpr::ArrayElement { name, .. }
            | AssignmentExpr::ArrayWhole { name, .. } => name,
        }
    }
}

impl fmt::Display for AssignmentExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentExpr::Scalar { name, value } => write!(f, "{name} = {value};"),
            AssignmentExpr::ArrayElement { name, index, value } => {
                write!(f, "{name}[{index}] = {value};")
            }
            AssignmentExpr::ArrayWhole { name, values } => {
                write!(f, "{name}[] = {};", values.join(", "))
            }
        }
    }
}

/// `trigger OP result;`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingExpr {
    pub trigger: Sequence,
    pub operator: MapOperator,
    pub result: Sequence,
}

impl MappingExpr {
    /// Canonical trigger key used by the mapping stores.
    ///
    /// Two trigger sequences collide iff their canonical forms are
    /// equal. Indicator-family mappings are keyed separately by an `i`
    /// prefix. The operator itself is not part of the key.
    #[must_use]
    pub fn trigger_key(&self) -> String {
        if self.operator.indicator {
            format!("i|{}", self.trigger)
        } else {
            self.trigger.to_string()
        }
    }
}

impl fmt::Display for MappingExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {};", self.trigger, self.operator, self.result)
    }
}

/// `P[n](c:w,…) : S0x…;` — binds a pixel's channels, optionally tied to
/// the scan code sharing its physical location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelChannelsExpr {
    pub pixel: PixelId,
    pub scancode: Option<u16>,
}

impl fmt::Display for PixelChannelsExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scancode {
            Some(code) => write!(f, "{} : S0x{code:02X};", self.pixel),
            None => write!(f, "{} : None;", self.pixel),
        }
    }
}

/// `P[n] <= x:…,y:…;`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelPositionExpr {
    pub index: u32,
    pub position: PhysicalPosition,
}

impl fmt::Display for PixelPositionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P[{}] <= {};", self.index, self.position)
    }
}

/// `S0x… <= x:…,y:…;`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanCodePositionExpr {
    pub scancode: u16,
    pub position: PhysicalPosition,
}

impl fmt::Display for ScanCodePositionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S0x{:02X} <= {};", self.scancode, self.position)
    }
}

/// Typed argument of a capability declaration (`state:1`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityArgDecl {
    pub name: String,
    pub width: u8,
}

impl fmt::Display for CapabilityArgDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.width)
    }
}

/// `name => cSymbol(arg:width, …);`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityExpr {
    pub name: String,
    pub symbol: String,
    pub args: Vec<CapabilityArgDecl>,
}

impl CapabilityExpr {
    /// True when two declarations agree on symbol and argument list.
    #[must_use]
    pub fn same_signature(&self, other: &CapabilityExpr) -> bool {
        self.symbol == other.symbol && self.args == other.args
    }
}

impl fmt::Display for CapabilityExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}(", self.name, self.symbol)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ");")
    }
}

/// `name => C_Identifier;`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefineExpr {
    pub name: String,
    pub symbol: String,
}

impl fmt::Display for DefineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {};", self.name, self.symbol)
    }
}

/// `A[name] <= modifier, modifier, …;`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationDefExpr {
    pub name: String,
    pub modifiers: Vec<AnimationModifier>,
}

impl fmt::Display for AnimationDefExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A[{}] <= ", self.name)?;
        for (idx, modifier) in self.modifiers.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{modifier}")?;
        }
        write!(f, ";")
    }
}

/// Operation applied to a pixel channel value in an animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelModOp {
    /// Bare value: set the channel
    Set,
    /// `+v`: add to the channel
    Add,
    /// `-v`: subtract from the channel
    Subtract,
}

/// A single channel operation within a frame target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelMod {
    pub op: PixelModOp,
    pub value: i64,
}

impl fmt::Display for PixelMod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            PixelModOp::Set => write!(f, "{}", self.value),
            PixelModOp::Add => write!(f, "+{}", self.value),
            PixelModOp::Subtract => write!(f, "-{}", self.value),
        }
    }
}

/// A frame target: the pixel (or scan code / HID id resolving to one)
/// and the channel operations applied to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelModExpr {
    pub target: Id,
    pub mods: Vec<PixelMod>,
}

impl fmt::Display for PixelModExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.target)?;
        for (idx, modifier) in self.mods.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{modifier}")?;
        }
        write!(f, ")")
    }
}

/// `A[name, frames…] <= P[n](v,v,v), …;`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationFrameExpr {
    pub name: String,
    pub frames: Vec<u32>,
    pub values: Vec<PixelModExpr>,
}

impl fmt::Display for AnimationFrameExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A[{}, ", self.name)?;
        for (idx, frame) in self.frames.iter().enumerate() {
            if idx > 0 {
                write!(f, ",")?;
            }
            write!(f, "{frame}")?;
        }
        write!(f, "] <= ")?;
        for (idx, value) in self.values.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ";")
    }
}

/// The kinds of statement a KLL file can contain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "expression", rename_all = "snake_case")]
pub enum ExpressionKind {
    Assignment(AssignmentExpr),
    Mapping(MappingExpr),
    PixelChannels(PixelChannelsExpr),
    PixelPosition(PixelPositionExpr),
    ScanCodePosition(ScanCodePositionExpr),
    Capability(CapabilityExpr),
    Define(DefineExpr),
    AnimationDef(AnimationDefExpr),
    AnimationFrame(AnimationFrameExpr),
}

/// A parsed statement with its source location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    pub origin: Origin,
    pub kind: ExpressionKind,
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExpressionKind::Assignment(e) => write!(f, "{e}"),
            ExpressionKind::Mapping(e) => write!(f, "{e}"),
            ExpressionKind::PixelChannels(e) => write!(f, "{e}"),
            ExpressionKind::PixelPosition(e) => write!(f, "{e}"),
            ExpressionKind::ScanCodePosition(e) => write!(f, "{e}"),
            ExpressionKind::Capability(e) => write!(f, "{e}"),
            ExpressionKind::Define(e) => write!(f, "{e}"),
            ExpressionKind::AnimationDef(e) => write!(f, "{e}"),
            ExpressionKind::AnimationFrame(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::id::{HidId, ScanCodeId};
    use crate::models::schedule::{ScheduleParam, ScheduleState};

    fn usb(symbol: &str, code: u16) -> Id {
        Id::Hid(HidId::named(HidKind::Keyboard, code, symbol))
    }

    #[test]
    fn test_trigger_key_equality() {
        let first = MappingExpr {
            trigger: Sequence::single(usb("A", 0x04)),
            operator: MapOperator::new(OpKind::Assign),
            result: Sequence::single(usb("B", 0x05)),
        };
        let second = MappingExpr {
            trigger: Sequence::single(usb("A", 0x04)),
            operator: MapOperator::new(OpKind::Append),
            result: Sequence::single(usb("C", 0x06)),
        };
        // Same trigger, different operator and result: same key
        assert_eq!(first.trigger_key(), second.trigger_key());

        let third = MappingExpr {
            trigger: Sequence::single(usb("B", 0x05)),
            operator: MapOperator::new(OpKind::Assign),
            result: Sequence::single(usb("B", 0x05)),
        };
        assert_ne!(first.trigger_key(), third.trigger_key());
    }

    #[test]
    fn test_indicator_keyspace_is_separate() {
        let plain = MappingExpr {
            trigger: Sequence::single(usb("A", 0x04)),
            operator: MapOperator::new(OpKind::Assign),
            result: Sequence::single(usb("B", 0x05)),
        };
        let indicator = MappingExpr {
            trigger: Sequence::single(usb("A", 0x04)),
            operator: MapOperator::indicator(OpKind::Assign),
            result: Sequence::single(usb("B", 0x05)),
        };
        assert_ne!(plain.trigger_key(), indicator.trigger_key());
    }

    #[test]
    fn test_scheduled_trigger_key_matches_bracketed_form() {
        // S0x43(P,UP,UR) and a single-element bracket list normalize to
        // the same ScheduledId, so their keys must agree.
        let schedule = Schedule {
            params: vec![
                ScheduleParam::State {
                    state: ScheduleState::Press,
                    timing: None,
                },
                ScheduleParam::State {
                    state: ScheduleState::UniquePress,
                    timing: None,
                },
                ScheduleParam::State {
                    state: ScheduleState::UniqueRelease,
                    timing: None,
                },
            ],
        };
        let scheduled = ScheduledId {
            id: Id::ScanCode(ScanCodeId::new(0x43)),
            schedule: Some(schedule),
        };
        let sequence = Sequence {
            combos: vec![Combo {
                elems: vec![ComboElem::Id(scheduled)],
            }],
        };
        assert_eq!(sequence.to_string(), "S0x43(P,UP,UR)");
    }

    #[test]
    fn test_combo_and_sequence_display() {
        let sequence = Sequence {
            combos: vec![
                Combo {
                    elems: vec![
                        ComboElem::Id(ScheduledId::bare(usb("LCTRL", 0xE0))),
                        ComboElem::Id(ScheduledId::bare(usb("A", 0x04))),
                    ],
                },
                Combo {
                    elems: vec![ComboElem::Id(ScheduledId::bare(usb("B", 0x05)))],
                },
            ],
        };
        assert_eq!(sequence.to_string(), "U\"LCTRL\" + U\"A\", U\"B\"");
    }

    #[test]
    fn test_range_display_and_codes() {
        let range = IdRange {
            kind: RangeKind::ScanCode,
            parts: vec![RangePart::Span(0x43, 0x45), RangePart::Single(0x50)],
            schedule: None,
        };
        assert_eq!(range.to_string(), "S[0x43-0x45,0x50]");
        let codes: Vec<u32> = range.codes().collect();
        assert_eq!(codes, vec![0x43, 0x44, 0x45, 0x50]);
    }

    #[test]
    fn test_reversed_span_enumerates_low_to_high() {
        let part = RangePart::Span(0x45, 0x43);
        let codes: Vec<u32> = part.codes().collect();
        assert_eq!(codes, vec![0x43, 0x44, 0x45]);
    }

    #[test]
    fn test_mapping_display() {
        let mapping = MappingExpr {
            trigger: Sequence::single(usb("A", 0x04)),
            operator: MapOperator::new(OpKind::Append),
            result: Sequence::single(usb("C", 0x06)),
        };
        assert_eq!(mapping.to_string(), "U\"A\" :+ U\"C\";");
    }

    #[test]
    fn test_assignment_display() {
        let whole = AssignmentExpr::ArrayWhole {
            name: "MacroList".to_string(),
            values: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(whole.to_string(), "MacroList[] = a, b;");

        let elem = AssignmentExpr::ArrayElement {
            name: "MacroList".to_string(),
            index: 1,
            value: "c".to_string(),
        };
        assert_eq!(elem.to_string(), "MacroList[1] = c;");
    }

    #[test]
    fn test_leading_scan_code() {
        let sequence = Sequence::single(Id::ScanCode(ScanCodeId::new(0x10)));
        assert_eq!(sequence.leading_scan_code(), Some(0x10));

        let hid = Sequence::single(usb("A", 0x04));
        assert_eq!(hid.leading_scan_code(), None);
    }
}
