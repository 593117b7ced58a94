//! Member repository over the datakit execution layer.
//!
//! Derived finders compile typed criteria; listings page with an independent
//! count; projections are closed over their requested fields; bulk mutations
//! go through a session so its identity map is invalidated.

use datakit_criteria::page::{Page, PageRequest};
use datakit_criteria::Criteria;
use datakit_db::criteria::{clamp_request, CriteriaExt, Paginator};
use datakit_db::projection::{
    fetch_dto, fetch_flat, fetch_native, nested_source, paginate_native, SparseRow,
};
use datakit_db::{
    AccessConfig, AccessError, Assignment, BulkUpdate, DbConnTrait, FetchPolicy, FieldMap, Session,
};
use sea_orm::{
    ActiveModelTrait, EntityTrait, JoinType, QuerySelect, RelationTrait, Set, Statement,
};

use crate::domain::{Member, MemberDto, MemberWithTeam, NewMember, Team, UsernameOnlyDto};

use super::entity::{member, team};
use super::fields::{member_fields, AGE, USERNAME};

const USERNAME_ONLY: &str = "UsernameOnly";
const MEMBER_ROW: &str = "MemberRow";
const MEMBER_WITH_TEAM: &str = "MemberWithTeam";

#[derive(Clone)]
pub struct MemberRepository {
    config: AccessConfig,
    fields: FieldMap<member::Entity>,
}

impl Default for MemberRepository {
    fn default() -> Self {
        Self::new(AccessConfig::default())
    }
}

impl MemberRepository {
    #[must_use]
    pub fn new(config: AccessConfig) -> Self {
        Self {
            config,
            fields: member_fields(),
        }
    }

    /// Insert a member; the returned value carries the store-assigned id.
    ///
    /// # Errors
    /// Uniqueness and FK violations surface as
    /// [`AccessError::ConstraintViolation`].
    pub async fn save<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
        new: NewMember,
    ) -> Result<Member, AccessError> {
        let inserted = member::ActiveModel {
            username: Set(new.username),
            age: Set(new.age),
            team_id: Set(new.team_id),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(|e| AccessError::from_db("member.save", e))?;

        tracing::debug!(id = inserted.id, "member saved");
        Ok(inserted.into())
    }

    /// # Errors
    /// See [`MemberRepository::save`].
    pub async fn create_team<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
        name: &str,
    ) -> Result<Team, AccessError> {
        let inserted = team::ActiveModel {
            name: Set(name.to_owned()),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(|e| AccessError::from_db("team.save", e))?;

        Ok(inserted.into())
    }

    /// Primary-key lookup through the session's identity map.
    ///
    /// # Errors
    /// Store failures only; a missing row is `None`.
    pub async fn find_by_id<C: DbConnTrait + Send + Sync>(
        &self,
        session: &Session<C>,
        id: i64,
    ) -> Result<Option<Member>, AccessError> {
        let found = session.get::<member::Entity>(id).await?;
        Ok(found.map(|m| Member::from((*m).clone())))
    }

    /// Derived finder: `username = ? AND age > ?`.
    ///
    /// # Errors
    /// Criteria compilation or store failures.
    pub async fn find_by_username_and_age_greater_than<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
        username: &str,
        age: i32,
    ) -> Result<Vec<Member>, AccessError> {
        let criteria = Criteria::new().with_filter(USERNAME.eq(username).and(AGE.gt(age)));

        let rows = member::Entity::find()
            .apply_criteria_filter(&criteria, &self.fields)?
            .all(conn)
            .await
            .map_err(|e| AccessError::from_db("member.find", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Membership finder. An empty name list is legal and matches no rows.
    ///
    /// # Errors
    /// Criteria compilation or store failures.
    pub async fn find_by_names<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
        names: &[&str],
    ) -> Result<Vec<Member>, AccessError> {
        let criteria = Criteria::new().with_filter(USERNAME.is_in(names.iter().copied()));

        let rows = member::Entity::find()
            .apply_criteria_filter(&criteria, &self.fields)?
            .all(conn)
            .await
            .map_err(|e| AccessError::from_db("member.find", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// # Errors
    /// Criteria compilation or store failures.
    pub async fn find_list_by_username<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
        username: &str,
    ) -> Result<Vec<Member>, AccessError> {
        let criteria = Criteria::new().with_filter(USERNAME.eq(username));

        let rows = member::Entity::find()
            .apply_criteria_filter(&criteria, &self.fields)?
            .all(conn)
            .await
            .map_err(|e| AccessError::from_db("member.find", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Single-result finder; zero matches is an error, not an empty value.
    ///
    /// # Errors
    /// [`AccessError::NotFound`] when no member carries the username.
    pub async fn find_one_by_username<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
        username: &str,
    ) -> Result<Member, AccessError> {
        self.find_optional_by_username(conn, username)
            .await?
            .ok_or_else(|| AccessError::NotFound {
                entity: "member",
                predicate: format!("username = '{username}'"),
            })
    }

    /// # Errors
    /// Criteria compilation or store failures; a missing row is `None`.
    pub async fn find_optional_by_username<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
        username: &str,
    ) -> Result<Option<Member>, AccessError> {
        let criteria = Criteria::new().with_filter(USERNAME.eq(username));

        let row = member::Entity::find()
            .apply_criteria_filter(&criteria, &self.fields)?
            .one(conn)
            .await
            .map_err(|e| AccessError::from_db("member.find_one", e))?;

        Ok(row.map(Into::into))
    }

    /// Closed interface-style projection: rows exposing only `username`.
    ///
    /// # Errors
    /// Store failures; accessing any other field on a returned row fails with
    /// [`AccessError::ProjectionFieldNotRequested`].
    pub async fn username_views<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
    ) -> Result<Vec<SparseRow>, AccessError> {
        let criteria = Criteria::new().with_select(vec![USERNAME.name().to_owned()]);
        fetch_flat(
            conn,
            member::Entity::find(),
            USERNAME_ONLY,
            &criteria,
            &self.fields,
        )
        .await
    }

    /// # Errors
    /// Store failures.
    pub async fn usernames<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
    ) -> Result<Vec<String>, AccessError> {
        let rows = self.username_views(conn).await?;
        rows.iter()
            .map(|row| Ok(row.str_field(USERNAME.name())?.to_owned()))
            .collect()
    }

    /// Class-style projection materialized through an explicit constructor.
    ///
    /// # Errors
    /// Store failures or a row whose username is not a string.
    pub async fn username_dtos<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
    ) -> Result<Vec<UsernameOnlyDto>, AccessError> {
        let criteria = Criteria::new().with_select(vec![USERNAME.name().to_owned()]);
        fetch_dto(
            conn,
            member::Entity::find(),
            USERNAME_ONLY,
            &criteria,
            &self.fields,
            |row| {
                Ok(UsernameOnlyDto {
                    username: row.str_field(USERNAME.name())?.to_owned(),
                })
            },
        )
        .await
    }

    /// Join-backed DTO listing: member id and username plus the team name.
    ///
    /// # Errors
    /// Store failures.
    pub async fn member_dtos<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
    ) -> Result<Vec<MemberDto>, AccessError> {
        let stmt = Statement::from_string(
            conn.get_database_backend(),
            "SELECT m.id AS id, m.username AS username, t.name AS team_name \
             FROM member m LEFT JOIN team t ON m.team_id = t.id \
             ORDER BY m.id",
        );

        let rows = fetch_native(conn, stmt, MEMBER_ROW, &["id", "username", "team_name"]).await?;
        rows.iter()
            .map(|row| {
                Ok(MemberDto {
                    id: row.i64_field("id")?,
                    username: row.str_field("username")?.to_owned(),
                    team_name: row.value("team_name")?.as_str().map(ToOwned::to_owned),
                })
            })
            .collect()
    }

    /// Nested projection for one username.
    ///
    /// Under an eager fetch policy for `team` the relation is joined up
    /// front; otherwise the team slot defers to [`MemberRepository::team_of`]
    /// on first access. With `strict_projections` a deferred slot is a
    /// construction-time [`AccessError::MissingJoin`] instead.
    ///
    /// # Errors
    /// Criteria compilation, store failures, or `MissingJoin` as above.
    pub async fn find_with_team<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
        username: &str,
    ) -> Result<Vec<MemberWithTeam>, AccessError> {
        let eager = self.config.fetch_policy("team") == FetchPolicy::Eager;

        // A strict config can never satisfy a deferred slot; refuse before
        // touching the store.
        if !eager && self.config.strict_projections {
            return Err(AccessError::MissingJoin {
                shape: MEMBER_WITH_TEAM,
                relation: "team",
            });
        }

        let criteria = Criteria::new().with_filter(USERNAME.eq(username));

        if eager {
            let rows = member::Entity::find()
                .apply_criteria_filter(&criteria, &self.fields)?
                .find_also_related(team::Entity)
                .all(conn)
                .await
                .map_err(|e| AccessError::from_db("member.find_with_team", e))?;

            return rows
                .into_iter()
                .map(|(m, t)| {
                    Ok(MemberWithTeam {
                        id: m.id,
                        username: m.username,
                        team_id: m.team_id,
                        team: nested_source(
                            &self.config,
                            MEMBER_WITH_TEAM,
                            "team",
                            Some(t.map(Team::from)),
                        )?,
                    })
                })
                .collect();
        }

        let rows = member::Entity::find()
            .apply_criteria_filter(&criteria, &self.fields)?
            .all(conn)
            .await
            .map_err(|e| AccessError::from_db("member.find_with_team", e))?;

        rows.into_iter()
            .map(|m| {
                Ok(MemberWithTeam {
                    id: m.id,
                    username: m.username,
                    team_id: m.team_id,
                    team: nested_source(&self.config, MEMBER_WITH_TEAM, "team", None)?,
                })
            })
            .collect()
    }

    /// Resolve the team slot of a nested view, paying the extra query at most
    /// once per view instance.
    ///
    /// # Errors
    /// Store failures from the deferred fetch.
    pub async fn team_of<'v, C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
        view: &'v MemberWithTeam,
    ) -> Result<&'v Option<Team>, AccessError> {
        view.team
            .get_or_fetch(|| async {
                let Some(team_id) = view.team_id else {
                    return Ok(None);
                };
                let found = team::Entity::find_by_id(team_id)
                    .one(conn)
                    .await
                    .map_err(|e| AccessError::from_db("team.find_by_id", e))?;
                Ok(found.map(Team::from))
            })
            .await
    }

    /// Paged listing of members with `age >= min_age`.
    ///
    /// The data query joins `team` for prefetching; totals come from a bare
    /// count over `member` with the same filter, so the join cannot multiply
    /// the count.
    ///
    /// # Errors
    /// Criteria compilation or store failures.
    pub async fn page_by_age<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
        min_age: i32,
        request: PageRequest,
    ) -> Result<Page<Member>, AccessError> {
        let request = clamp_request(&self.config, request);
        let criteria = Criteria::new().with_filter(AGE.ge(min_age));

        let data = member::Entity::find().join(JoinType::LeftJoin, member::Relation::Team.def());

        let page = Paginator::new(data, &self.fields)
            .fetch(conn, &criteria, &request)
            .await?;

        Ok(page.map(Into::into))
    }

    /// Set-based age increment over all members with `age >= min_age`.
    ///
    /// Runs as one UPDATE through the session; the member identity map is
    /// evicted unconditionally afterwards.
    ///
    /// # Errors
    /// Criteria compilation or store failures; never retried.
    pub async fn bulk_age_plus<C: DbConnTrait + Send + Sync>(
        &self,
        session: &Session<C>,
        min_age: i32,
    ) -> Result<u64, AccessError> {
        BulkUpdate::new(&self.fields)
            .filter(AGE.ge(min_age))
            .assign(Assignment::add(AGE.name(), 1))
            .execute(session)
            .await
    }

    /// Hand-written native listing bound by column alias, paged with its own
    /// count statement.
    ///
    /// # Errors
    /// Store failures.
    pub async fn native_member_page<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
        request: PageRequest,
    ) -> Result<Page<SparseRow>, AccessError> {
        let request = clamp_request(&self.config, request);
        let backend = conn.get_database_backend();

        let data = Statement::from_sql_and_values(
            backend,
            "SELECT t.name AS team_name, m.id AS id, m.username AS username \
             FROM member m LEFT JOIN team t ON m.team_id = t.id \
             ORDER BY m.username LIMIT ? OFFSET ?",
            [
                i64::try_from(request.size).unwrap_or(i64::MAX).into(),
                i64::try_from(request.offset()).unwrap_or(i64::MAX).into(),
            ],
        );
        let count = Statement::from_string(backend, "SELECT COUNT(*) FROM member");

        paginate_native(
            conn,
            data,
            count,
            MEMBER_ROW,
            &["id", "username", "team_name"],
            &request,
        )
        .await
    }

    /// Members with their team eagerly joined.
    ///
    /// # Errors
    /// Store failures.
    pub async fn find_all_with_team<C: DbConnTrait + Send + Sync>(
        &self,
        conn: &C,
    ) -> Result<Vec<(Member, Option<Team>)>, AccessError> {
        let rows = member::Entity::find()
            .find_also_related(team::Entity)
            .all(conn)
            .await
            .map_err(|e| AccessError::from_db("member.find_all_with_team", e))?;

        Ok(rows
            .into_iter()
            .map(|(m, t)| (m.into(), t.map(Team::from)))
            .collect())
    }
}
