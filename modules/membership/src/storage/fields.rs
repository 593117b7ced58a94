//! Typed field references and the criteria field mapping for member queries.

use datakit_criteria::{FieldRef, Schema};
use datakit_db::{FieldKind, FieldMap};

use super::entity::member;

#[derive(Copy, Clone, Eq, PartialEq)]
pub enum MemberField {
    Id,
    Username,
    Age,
    TeamId,
}

pub struct MemberSchema;

impl Schema for MemberSchema {
    type Field = MemberField;

    fn field_name(field: Self::Field) -> &'static str {
        match field {
            MemberField::Id => "id",
            MemberField::Username => "username",
            MemberField::Age => "age",
            MemberField::TeamId => "team_id",
        }
    }
}

pub const ID: FieldRef<MemberSchema, i64> = FieldRef::new(MemberField::Id);
pub const USERNAME: FieldRef<MemberSchema, String> = FieldRef::new(MemberField::Username);
pub const AGE: FieldRef<MemberSchema, i32> = FieldRef::new(MemberField::Age);
pub const TEAM_ID: FieldRef<MemberSchema, i64> = FieldRef::new(MemberField::TeamId);

/// Field mapping consumed by the criteria compiler for member queries.
#[must_use]
pub fn member_fields() -> FieldMap<member::Entity> {
    FieldMap::<member::Entity>::new()
        .insert(ID.name(), member::Column::Id, FieldKind::I64)
        .insert(USERNAME.name(), member::Column::Username, FieldKind::String)
        .insert(AGE.name(), member::Column::Age, FieldKind::I32)
        .insert(TEAM_ID.name(), member::Column::TeamId, FieldKind::I64)
}
