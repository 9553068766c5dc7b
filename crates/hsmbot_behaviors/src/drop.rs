//! Put down whatever the robot carries.

use hsmbot_core::{Composite, NodeSpec, Result};

use crate::nodes::{Forward, ParentCompletes, SetHeadAngle, SetLiftHeight, SetNotCarrying};

pub fn drop_object_body() -> Result<Composite> {
    Composite::builder()
        .node("lower", SetLiftHeight::new(0.0))
        .node("clear", SetNotCarrying)
        .node("backup", Forward::new(-10.0))
        .node("lookdown", SetHeadAngle::new(-20.0))
        .node("done", ParentCompletes)
        .on_completion(&["lower"], &["clear"])
        .on_completion(&["clear"], &["backup", "lookdown"])
        .on_completion(&["backup", "lookdown"], &["done"])
        .build()
}

pub fn drop_object(name: &str) -> Result<NodeSpec> {
    Ok(NodeSpec::group(name, drop_object_body()?))
}
