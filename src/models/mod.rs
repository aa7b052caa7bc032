//! Core data model: identifiers, schedules, positions, and expressions.

pub mod expression;
pub mod id;
pub mod position;
pub mod schedule;

// Re-export commonly used types
pub use expression::{
    AssignmentExpr, Combo, ComboElem, Expression, ExpressionKind, IdRange, MapOperator,
    MappingExpr, OpKind, Origin, RangePart, ScheduledId, Sequence,
};
pub use id::{
    AnimationId, AnimationModifier, CapabilityCall, GenericTriggerId, HidId, HidKind, Id, LayerId,
    LayerMode, PixelAddressMode, PixelChannel, PixelId, PixelLayerId, ScanCodeId,
};
pub use position::PhysicalPosition;
pub use schedule::{Schedule, ScheduleParam, ScheduleState, Time, TimeUnit};
