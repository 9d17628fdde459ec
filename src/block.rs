use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique block identifier (sortable, timestamp-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub Ulid);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point on the canvas (pixels)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Rectangle representing position and size on canvas
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rectangle {
    /// Create a new rectangle
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Get the right edge of the rectangle
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Get the bottom edge of the rectangle
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Top-left corner
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Same size, shifted by a delta
    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Same size, moved so the top-left corner sits at `origin`
    pub fn with_origin(&self, origin: Point) -> Self {
        Self::new(origin.x, origin.y, self.width, self.height)
    }

    /// Check if this rectangle intersects with another
    pub fn intersects(&self, other: &Rectangle) -> bool {
        !(self.right() <= other.x
            || other.right() <= self.x
            || self.bottom() <= other.y
            || other.bottom() <= self.y)
    }

    /// Check if this rectangle contains a point
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }
}

/// The eight block kinds, grouped into three families
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Module,
    RuleSet,
    Subroutine,
    Condition,
    Action,
    Event,
    Literal,
    Expression,
}

/// Shape family of a block kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KindFamily {
    Container,
    Statement,
    Value,
}

impl BlockKind {
    pub const ALL: [BlockKind; 8] = [
        BlockKind::Module,
        BlockKind::RuleSet,
        BlockKind::Subroutine,
        BlockKind::Condition,
        BlockKind::Action,
        BlockKind::Event,
        BlockKind::Literal,
        BlockKind::Expression,
    ];

    pub fn family(self) -> KindFamily {
        match self {
            BlockKind::Module | BlockKind::RuleSet | BlockKind::Subroutine => KindFamily::Container,
            BlockKind::Condition | BlockKind::Action | BlockKind::Event => KindFamily::Statement,
            BlockKind::Literal | BlockKind::Expression => KindFamily::Value,
        }
    }

    pub fn is_container(self) -> bool {
        self.family() == KindFamily::Container
    }

    pub fn is_statement(self) -> bool {
        self.family() == KindFamily::Statement
    }

    pub fn is_value(self) -> bool {
        self.family() == KindFamily::Value
    }

    /// Kinds with previous/next anchors. Modules are roots and never chain.
    pub fn chains(self) -> bool {
        !self.is_value() && self != BlockKind::Module
    }

    /// Kinds with horizontal dock anchors
    pub fn docks(self) -> bool {
        self.is_statement()
    }

    /// Human-readable default label
    pub fn title(self) -> &'static str {
        match self {
            BlockKind::Module => "Module",
            BlockKind::RuleSet => "Rule",
            BlockKind::Subroutine => "Subroutine",
            BlockKind::Condition => "Condition",
            BlockKind::Action => "Action",
            BlockKind::Event => "Event",
            BlockKind::Literal => "Literal",
            BlockKind::Expression => "Expression",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockKind::Module => "module",
            BlockKind::RuleSet => "rule_set",
            BlockKind::Subroutine => "subroutine",
            BlockKind::Condition => "condition",
            BlockKind::Action => "action",
            BlockKind::Event => "event",
            BlockKind::Literal => "literal",
            BlockKind::Expression => "expression",
        };
        f.write_str(name)
    }
}

/// Type tag used for value-slot compatibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Any,
    Number,
    String,
    Boolean,
    Player,
    Vector,
}

impl ValueType {
    /// `Any` on either side matches; otherwise the tags must be equal.
    pub fn compatible_with(self, other: ValueType) -> bool {
        self == ValueType::Any || other == ValueType::Any || self == other
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Any => "any",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Boolean => "boolean",
            ValueType::Player => "player",
            ValueType::Vector => "vector",
        };
        f.write_str(name)
    }
}

/// Literal value stored inline in a Literal block or as a slot default
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LiteralValue {
    Number(f64),
    Boolean(bool),
    Text(String),
}

impl LiteralValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            LiteralValue::Number(_) => ValueType::Number,
            LiteralValue::Boolean(_) => ValueType::Boolean,
            LiteralValue::Text(_) => ValueType::String,
        }
    }
}

impl From<f64> for LiteralValue {
    fn from(n: f64) -> Self {
        LiteralValue::Number(n)
    }
}

impl From<bool> for LiteralValue {
    fn from(b: bool) -> Self {
        LiteralValue::Boolean(b)
    }
}

impl From<&str> for LiteralValue {
    fn from(s: &str) -> Self {
        LiteralValue::Text(s.to_string())
    }
}

/// Named parameter slot: at most one nested Value block plus an optional default
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamSlot {
    pub name: String,
    pub accepts: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<BlockId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<LiteralValue>,
}

impl ParamSlot {
    pub fn new(name: impl Into<String>, accepts: ValueType) -> Self {
        Self {
            name: name.into(),
            accepts,
            value: None,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<LiteralValue>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Named container slot holding the head of a statement chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerSlot {
    pub name: String,
    pub accepts: Vec<BlockKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<BlockId>,
}

impl ContainerSlot {
    pub fn new(name: impl Into<String>, accepts: &[BlockKind]) -> Self {
        Self {
            name: name.into(),
            accepts: accepts.to_vec(),
            head: None,
        }
    }
}

/// Module-level variable declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalVariable {
    pub name: String,
    pub initial: LiteralValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleBody {
    pub slots: Vec<ContainerSlot>,
    #[serde(default)]
    pub globals: Vec<GlobalVariable>,
}

impl Default for ModuleBody {
    fn default() -> Self {
        Self {
            slots: vec![ContainerSlot::new(
                "rules",
                &[BlockKind::RuleSet, BlockKind::Subroutine],
            )],
            globals: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSetBody {
    pub slots: Vec<ContainerSlot>,
    pub enabled: bool,
}

impl Default for RuleSetBody {
    fn default() -> Self {
        Self {
            slots: vec![
                ContainerSlot::new("event", &[BlockKind::Event]),
                ContainerSlot::new("conditions", &[BlockKind::Condition]),
                ContainerSlot::new("actions", &[BlockKind::Action]),
            ],
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubroutineBody {
    pub name: String,
    pub slots: Vec<ContainerSlot>,
}

impl SubroutineBody {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: vec![ContainerSlot::new("actions", &[BlockKind::Action])],
        }
    }
}

/// Body shared by Condition, Action and Event blocks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatementBody {
    pub opcode: String,
    #[serde(default)]
    pub params: Vec<ParamSlot>,
    /// Name of the subroutine this statement calls, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subroutine: Option<String>,
}

impl StatementBody {
    pub fn new(opcode: impl Into<String>) -> Self {
        Self {
            opcode: opcode.into(),
            params: Vec::new(),
            subroutine: None,
        }
    }

    /// A statement that calls a named subroutine
    pub fn call(subroutine: impl Into<String>) -> Self {
        Self {
            opcode: "call_subroutine".to_string(),
            params: Vec::new(),
            subroutine: Some(subroutine.into()),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, accepts: ValueType) -> Self {
        self.params.push(ParamSlot::new(name, accepts));
        self
    }

    pub fn with_slot(mut self, slot: ParamSlot) -> Self {
        self.params.push(slot);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiteralBody {
    pub value: LiteralValue,
    pub value_type: ValueType,
}

impl LiteralBody {
    pub fn new(value: impl Into<LiteralValue>) -> Self {
        let value = value.into();
        Self {
            value_type: value.value_type(),
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpressionBody {
    pub operator: String,
    #[serde(default)]
    pub params: Vec<ParamSlot>,
    pub value_type: ValueType,
}

impl ExpressionBody {
    pub fn new(operator: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            operator: operator.into(),
            params: Vec::new(),
            value_type,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, accepts: ValueType) -> Self {
        self.params.push(ParamSlot::new(name, accepts));
        self
    }
}

/// Kind-specific payload. The variant is the block's kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockBody {
    Module(ModuleBody),
    RuleSet(RuleSetBody),
    Subroutine(SubroutineBody),
    Condition(StatementBody),
    Action(StatementBody),
    Event(StatementBody),
    Literal(LiteralBody),
    Expression(ExpressionBody),
}

impl BlockBody {
    /// Default body for a freshly spawned block of `kind`
    pub fn for_kind(kind: BlockKind) -> Self {
        match kind {
            BlockKind::Module => BlockBody::Module(ModuleBody::default()),
            BlockKind::RuleSet => BlockBody::RuleSet(RuleSetBody::default()),
            BlockKind::Subroutine => BlockBody::Subroutine(SubroutineBody::named("subroutine")),
            BlockKind::Condition => BlockBody::Condition(StatementBody::new("condition")),
            BlockKind::Action => BlockBody::Action(StatementBody::new("action")),
            BlockKind::Event => BlockBody::Event(StatementBody::new("ongoing")),
            BlockKind::Literal => BlockBody::Literal(LiteralBody::new(0.0)),
            BlockKind::Expression => BlockBody::Expression(
                ExpressionBody::new("add", ValueType::Number)
                    .with_param("left", ValueType::Number)
                    .with_param("right", ValueType::Number),
            ),
        }
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            BlockBody::Module(_) => BlockKind::Module,
            BlockBody::RuleSet(_) => BlockKind::RuleSet,
            BlockBody::Subroutine(_) => BlockKind::Subroutine,
            BlockBody::Condition(_) => BlockKind::Condition,
            BlockBody::Action(_) => BlockKind::Action,
            BlockBody::Event(_) => BlockKind::Event,
            BlockBody::Literal(_) => BlockKind::Literal,
            BlockBody::Expression(_) => BlockKind::Expression,
        }
    }

    pub fn slots(&self) -> &[ContainerSlot] {
        match self {
            BlockBody::Module(m) => &m.slots,
            BlockBody::RuleSet(r) => &r.slots,
            BlockBody::Subroutine(s) => &s.slots,
            _ => &[],
        }
    }

    pub fn slots_mut(&mut self) -> &mut [ContainerSlot] {
        match self {
            BlockBody::Module(m) => &mut m.slots,
            BlockBody::RuleSet(r) => &mut r.slots,
            BlockBody::Subroutine(s) => &mut s.slots,
            _ => &mut [],
        }
    }

    pub fn params(&self) -> &[ParamSlot] {
        match self {
            BlockBody::Condition(s) | BlockBody::Action(s) | BlockBody::Event(s) => &s.params,
            BlockBody::Expression(e) => &e.params,
            _ => &[],
        }
    }

    pub fn params_mut(&mut self) -> &mut [ParamSlot] {
        match self {
            BlockBody::Condition(s) | BlockBody::Action(s) | BlockBody::Event(s) => {
                &mut s.params
            }
            BlockBody::Expression(e) => &mut e.params,
            _ => &mut [],
        }
    }

    pub fn statement(&self) -> Option<&StatementBody> {
        match self {
            BlockBody::Condition(s) | BlockBody::Action(s) | BlockBody::Event(s) => Some(s),
            _ => None,
        }
    }

    /// Declared output type of a Value block
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            BlockBody::Literal(l) => Some(l.value_type),
            BlockBody::Expression(e) => Some(e.value_type),
            _ => None,
        }
    }
}

/// An ownership edge, stored on the owned block.
///
/// A block with `owner == None` is free (top-level).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "relation", rename_all = "snake_case")]
pub enum Role {
    /// `next` successor of `previous` in a statement chain
    Next { previous: BlockId },
    /// Head of a named container slot
    Slot { container: BlockId, slot: String },
    /// Docked to the right of `left`
    Dock { left: BlockId },
    /// Nested into a parameter slot of `parent`
    Value { parent: BlockId, param: String },
}

impl Role {
    /// The block on the owning side of the edge
    pub fn owner_block(&self) -> BlockId {
        match self {
            Role::Next { previous } => *previous,
            Role::Slot { container, .. } => *container,
            Role::Dock { left } => *left,
            Role::Value { parent, .. } => *parent,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Next { previous } => write!(f, "next of {}", previous),
            Role::Slot { container, slot } => write!(f, "slot '{}' of {}", slot, container),
            Role::Dock { left } => write!(f, "dock right of {}", left),
            Role::Value { parent, param } => write!(f, "parameter '{}' of {}", param, parent),
        }
    }
}

/// A block on the canvas
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub id: BlockId,

    /// Display label
    pub label: String,

    /// Cached position and size; owned by the renderer
    pub geometry: Rectangle,

    #[serde(flatten)]
    pub body: BlockBody,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Role>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<BlockId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dock_right: Option<BlockId>,
}

impl Block {
    /// Create an unowned block with no connections
    pub fn new(id: BlockId, body: BlockBody, geometry: Rectangle) -> Self {
        Self {
            id,
            label: body.kind().title().to_string(),
            geometry,
            body,
            owner: None,
            next: None,
            dock_right: None,
        }
    }

    pub fn kind(&self) -> BlockKind {
        self.body.kind()
    }

    pub fn slot(&self, name: &str) -> Option<&ContainerSlot> {
        self.body.slots().iter().find(|s| s.name == name)
    }

    pub fn slot_mut(&mut self, name: &str) -> Option<&mut ContainerSlot> {
        self.body.slots_mut().iter_mut().find(|s| s.name == name)
    }

    pub fn param(&self, name: &str) -> Option<&ParamSlot> {
        self.body.params().iter().find(|p| p.name == name)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut ParamSlot> {
        self.body.params_mut().iter_mut().find(|p| p.name == name)
    }

    /// Blocks this block owns directly: nested values, slot heads, dock, next.
    pub fn owned_children(&self) -> Vec<BlockId> {
        let mut children: Vec<BlockId> =
            self.body.params().iter().filter_map(|p| p.value).collect();
        children.extend(self.body.slots().iter().filter_map(|s| s.head));
        children.extend(self.dock_right);
        children.extend(self.next);
        children
    }

    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }
}
