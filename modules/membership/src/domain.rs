//! Domain types for the membership module.

use datakit_db::projection::LazyRef;

/// A member, optionally assigned to a team.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub id: i64,
    pub username: String,
    pub age: i32,
    pub team_id: Option<i64>,
}

/// Insert payload; the store assigns the identifier.
#[derive(Clone, Debug)]
pub struct NewMember {
    pub username: String,
    pub age: i32,
    pub team_id: Option<i64>,
}

impl NewMember {
    pub fn new(username: impl Into<String>, age: i32) -> Self {
        Self {
            username: username.into(),
            age,
            team_id: None,
        }
    }

    #[must_use]
    pub fn in_team(mut self, team_id: i64) -> Self {
        self.team_id = Some(team_id);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Team {
    pub id: i64,
    pub name: String,
}

/// Flat class-style projection: just the username, materialized eagerly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsernameOnlyDto {
    pub username: String,
}

/// Join-backed listing row: member identity plus the team name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberDto {
    pub id: i64,
    pub username: String,
    pub team_name: Option<String>,
}

/// Nested projection: member fields plus a team slot that is either joined
/// eagerly or resolved lazily on first access.
#[derive(Debug)]
pub struct MemberWithTeam {
    pub id: i64,
    pub username: String,
    pub team_id: Option<i64>,
    pub team: LazyRef<Option<Team>>,
}
