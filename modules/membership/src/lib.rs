//! Membership module: members grouped into teams.
//!
//! Serves as the reference consumer of the datakit stack: typed criteria over
//! member fields, offset-paged listings, closed projections (flat, DTO,
//! nested and native) and set-based bulk mutations through a session.

pub mod domain;
pub mod storage;

pub use domain::{Member, MemberDto, MemberWithTeam, NewMember, Team, UsernameOnlyDto};
pub use storage::repository::MemberRepository;
