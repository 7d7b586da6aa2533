//! 规划层：步骤模型、规划器输出归一化、prompt、规划适配器、环境采集与主循环

pub mod context;
pub mod loop_;
pub mod parse;
pub mod planner;
pub mod prompts;
pub mod step;

pub use context::{Context, ContextGatherer, DesktopContextGatherer, MAX_LISTED_APPS};
pub use loop_::{run_plan, PlanSession, CANCELLED_MESSAGE};
pub use parse::{
    parse_routing, parse_steps, truncate_chars, ParsedPlan, ParsedRouting, PlanSource,
    RoutingDecision, RoutingSource, EXCERPT_CHARS,
};
pub use planner::{PlannerAdapter, PlannerSettings, RouteInput};
pub use step::{split_keys, Action, Params, Plan, Step, DEFAULT_DONE_MESSAGE};
