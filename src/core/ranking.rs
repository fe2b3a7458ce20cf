//! Ranking engine.
//!
//! Ranks are computed by [`compute_ranks`], a pure function over scores and
//! populations, and then written back onto the persisted records by the
//! `rank_*` functions.
//!
//! - Fractional scopes (student in class, teacher in school, class in school):
//!   `round(position / population, 4)` where `position` is the strict 1-based
//!   position after a stable descending sort. Equal scores still get distinct
//!   positions. A population of 0 yields rank 0.
//! - Flat scopes: competition ranking, ties share a rank and the next distinct
//!   score takes its 1-based position (1, 1, 3).
//!
//! Entities without a usable score are not ranked and get rank 0.

use crate::{
    core::{
        aggregate::{ClassAggregate, StudentAggregate, TeacherAggregate, round_to},
        scope::RankingScope,
    },
    entities::{
        Class, ReportCard, User, class, class_report, report_card, teacher_report, user,
    },
    errors::{Error, Result},
};
use sea_orm::{QuerySelect, Select, Set, prelude::*};
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument, warn};

/// Something that carries a score to rank by.
///
/// The ranking score is `total_score`, falling back to `average_score`, then
/// to `average`. Non-finite values count as missing.
pub trait Rankable {
    /// Summed score, if the entity has one
    fn total_score(&self) -> Option<f64> {
        None
    }

    /// Mean score, if the entity has one
    fn average_score(&self) -> Option<f64> {
        None
    }

    /// Per-subject average, if the entity has one
    fn average(&self) -> Option<f64> {
        None
    }

    /// Score used for ordering
    fn rank_score(&self) -> Option<f64> {
        self.total_score()
            .or_else(|| self.average_score())
            .or_else(|| self.average())
            .filter(|score| score.is_finite())
    }
}

impl Rankable for StudentAggregate {
    fn total_score(&self) -> Option<f64> {
        Some(self.total_score)
    }

    fn average(&self) -> Option<f64> {
        Some(self.average)
    }
}

impl Rankable for TeacherAggregate {
    fn average_score(&self) -> Option<f64> {
        Some(self.average_score)
    }
}

impl Rankable for ClassAggregate {
    fn total_score(&self) -> Option<f64> {
        Some(self.total_score)
    }

    fn average_score(&self) -> Option<f64> {
        Some(self.average_score)
    }
}

impl Rankable for report_card::Model {
    fn total_score(&self) -> Option<f64> {
        Some(self.total_score)
    }

    fn average(&self) -> Option<f64> {
        Some(self.average)
    }
}

impl Rankable for teacher_report::Model {
    fn average_score(&self) -> Option<f64> {
        Some(self.average_score)
    }
}

impl Rankable for class_report::Model {
    fn total_score(&self) -> Option<f64> {
        Some(self.total_score)
    }

    fn average_score(&self) -> Option<f64> {
        Some(self.average_score)
    }
}

/// Computes one rank per score.
///
/// `populations` is only read for fractional scopes and must then hold one
/// entry per score (the size of that entity's population).
#[must_use]
#[allow(clippy::cast_precision_loss)] // positions and populations are small
pub fn compute_ranks(scores: &[Option<f64>], scope: RankingScope, populations: &[u64]) -> Vec<f64> {
    let mut ranks = vec![0.0; scores.len()];

    let mut order: Vec<(usize, f64)> = scores
        .iter()
        .enumerate()
        .filter_map(|(index, score)| score.map(|s| (index, s)))
        .collect();
    // Stable: equal scores keep their input order.
    order.sort_by(|a, b| b.1.total_cmp(&a.1));

    match scope {
        RankingScope::Flat => {
            let mut previous: Option<(f64, f64)> = None;
            for (position, (index, score)) in order.into_iter().enumerate() {
                let rank = match previous {
                    Some((prev_score, prev_rank)) if prev_score.total_cmp(&score).is_eq() => prev_rank,
                    _ => (position + 1) as f64,
                };
                ranks[index] = rank;
                previous = Some((score, rank));
            }
        }
        RankingScope::StudentInClass | RankingScope::TeacherInSchool | RankingScope::ClassInSchool => {
            for (position, (index, _)) in order.into_iter().enumerate() {
                let population = populations.get(index).copied().unwrap_or_default();
                ranks[index] = if population == 0 {
                    0.0
                } else {
                    round_to((position + 1) as f64 / population as f64, 4)
                };
            }
        }
    }

    ranks
}

/// Competition ranks for in-memory rows that are never persisted.
#[must_use]
pub fn rank_in_memory<T: Rankable>(items: &[T]) -> Vec<f64> {
    let scores: Vec<Option<f64>> = items.iter().map(Rankable::rank_score).collect();
    compute_ranks(&scores, RankingScope::Flat, &[])
}

/// A rank write-back that stopped part way.
///
/// `entities` holds the full list: the first `ranked` carry their stored
/// rank, the rest are unchanged.
#[derive(Debug)]
pub struct RankingFailure<T> {
    /// The full, partially ranked list
    pub entities: Vec<T>,
    /// Why the write-back stopped
    pub error: Error,
}

impl<T> From<RankingFailure<T>> for Error {
    fn from(failure: RankingFailure<T>) -> Self {
        failure.error
    }
}

/// Result of a persisting rank operation
pub type RankingResult<T> = std::result::Result<Vec<T>, RankingFailure<T>>;

trait StoredRank: Rankable + Sized {
    async fn store_rank<C: ConnectionTrait>(&self, db: &C, rank: f64) -> Result<Self>;
}

impl StoredRank for report_card::Model {
    async fn store_rank<C: ConnectionTrait>(&self, db: &C, rank: f64) -> Result<Self> {
        let mut active: report_card::ActiveModel = self.clone().into();
        active.rank = Set(rank);
        active.update(db).await.map_err(Into::into)
    }
}

impl StoredRank for teacher_report::Model {
    async fn store_rank<C: ConnectionTrait>(&self, db: &C, rank: f64) -> Result<Self> {
        let mut active: teacher_report::ActiveModel = self.clone().into();
        active.rank = Set(rank);
        active.update(db).await.map_err(Into::into)
    }
}

impl StoredRank for class_report::Model {
    async fn store_rank<C: ConnectionTrait>(&self, db: &C, rank: f64) -> Result<Self> {
        let mut active: class_report::ActiveModel = self.clone().into();
        active.rank = Set(rank);
        active.update(db).await.map_err(Into::into)
    }
}

async fn persist_ranks<C, T>(db: &C, entities: Vec<T>, ranks: &[f64]) -> RankingResult<T>
where
    C: ConnectionTrait,
    T: StoredRank,
{
    let total = entities.len();
    let mut stored = Vec::with_capacity(total);
    let mut remaining = entities.into_iter();

    for rank in ranks {
        let Some(entity) = remaining.next() else {
            break;
        };
        match entity.store_rank(db, *rank).await {
            Ok(updated) => stored.push(updated),
            Err(source) => {
                let ranked = stored.len();
                warn!(ranked, total, "Rank write-back failed: {source}");
                stored.push(entity);
                stored.extend(remaining);
                return Err(RankingFailure {
                    entities: stored,
                    error: Error::Ranking {
                        ranked,
                        total,
                        source: Box::new(source),
                    },
                });
            }
        }
    }

    Ok(stored)
}

fn scores_of<T: Rankable>(entities: &[T]) -> Vec<Option<f64>> {
    entities.iter().map(Rankable::rank_score).collect()
}

/// Ranks report cards and writes each rank back.
///
/// `StudentInClass` divides by the number of report cards sharing the card's
/// class, school, academic year and term. `Flat` uses competition ranking.
#[instrument(skip(db, cards), fields(count = cards.len()))]
pub async fn rank_report_cards<C>(
    db: &C,
    cards: Vec<report_card::Model>,
    scope: RankingScope,
) -> RankingResult<report_card::Model>
where
    C: ConnectionTrait,
{
    let counted = match scope {
        RankingScope::StudentInClass => class_populations(db, &cards).await,
        RankingScope::Flat => Ok(Vec::new()),
        RankingScope::TeacherInSchool | RankingScope::ClassInSchool => Err(Error::InvalidScope {
            message: format!("Report cards cannot be ranked with {scope:?}"),
        }),
    };
    let populations = match counted {
        Ok(populations) => populations,
        Err(error) => return Err(RankingFailure { entities: cards, error }),
    };

    let ranks = compute_ranks(&scores_of(&cards), scope, &populations);
    debug!(?ranks, "Computed report card ranks");
    persist_ranks(db, cards, &ranks).await
}

/// Ranks teacher reports against the school's active teachers and writes each rank back.
///
/// Reports of teachers outside that population (inactive, deleted or from
/// another school) are not ranked and get rank 0.
#[instrument(skip(db, reports), fields(count = reports.len()))]
pub async fn rank_teacher_reports<C>(
    db: &C,
    reports: Vec<teacher_report::Model>,
) -> RankingResult<teacher_report::Model>
where
    C: ConnectionTrait,
{
    let members = reports.iter().map(|r| (r.school_id, r.teacher_id));
    let counted = school_rosters(db, members, SchoolPopulation::Teachers).await;
    let (populations, eligible) = match counted {
        Ok(rosters) => rosters,
        Err(error) => return Err(RankingFailure { entities: reports, error }),
    };
    let scores = eligible_scores(&reports, &eligible);
    let ranks = compute_ranks(&scores, RankingScope::TeacherInSchool, &populations);
    persist_ranks(db, reports, &ranks).await
}

/// Ranks class reports against the school's active classes and writes each rank back.
///
/// Reports of classes outside that population get rank 0.
#[instrument(skip(db, reports), fields(count = reports.len()))]
pub async fn rank_class_reports<C>(
    db: &C,
    reports: Vec<class_report::Model>,
) -> RankingResult<class_report::Model>
where
    C: ConnectionTrait,
{
    let members = reports.iter().map(|r| (r.school_id, r.class_id));
    let counted = school_rosters(db, members, SchoolPopulation::Classes).await;
    let (populations, eligible) = match counted {
        Ok(rosters) => rosters,
        Err(error) => return Err(RankingFailure { entities: reports, error }),
    };
    let scores = eligible_scores(&reports, &eligible);
    let ranks = compute_ranks(&scores, RankingScope::ClassInSchool, &populations);
    persist_ranks(db, reports, &ranks).await
}

async fn class_populations<C>(db: &C, cards: &[report_card::Model]) -> Result<Vec<u64>>
where
    C: ConnectionTrait,
{
    let mut cache: HashMap<(i64, i64, String, Option<i64>), u64> = HashMap::new();
    let mut populations = Vec::with_capacity(cards.len());
    for card in cards {
        let key = (
            card.class_id,
            card.school_id,
            card.academic_year.clone(),
            card.term_id,
        );
        let population = if let Some(population) = cache.get(&key) {
            *population
        } else {
            let mut query = ReportCard::find()
                .filter(report_card::Column::ClassId.eq(card.class_id))
                .filter(report_card::Column::SchoolId.eq(card.school_id))
                .filter(report_card::Column::AcademicYear.eq(card.academic_year.as_str()));
            query = match card.term_id {
                Some(term_id) => query.filter(report_card::Column::TermId.eq(term_id)),
                None => query.filter(report_card::Column::TermId.is_null()),
            };
            let population = query.count(db).await?;
            cache.insert(key, population);
            population
        };
        populations.push(population);
    }
    Ok(populations)
}

fn eligible_scores<T: Rankable>(entities: &[T], eligible: &[bool]) -> Vec<Option<f64>> {
    entities
        .iter()
        .zip(eligible)
        .map(|(entity, counted)| entity.rank_score().filter(|_| *counted))
        .collect()
}

#[derive(Clone, Copy)]
enum SchoolPopulation {
    Teachers,
    Classes,
}

/// Population size per `(school, member)` pair and whether the member belongs
/// to that population.
async fn school_rosters<C>(
    db: &C,
    members: impl Iterator<Item = (i64, i64)>,
    population: SchoolPopulation,
) -> Result<(Vec<u64>, Vec<bool>)>
where
    C: ConnectionTrait,
{
    let mut cache: HashMap<i64, HashSet<i64>> = HashMap::new();
    let mut populations = Vec::new();
    let mut eligible = Vec::new();
    for (school_id, member_id) in members {
        if !cache.contains_key(&school_id) {
            let ids: Vec<i64> = match population {
                SchoolPopulation::Teachers => {
                    active_teachers(school_id)
                        .select_only()
                        .column(user::Column::Id)
                        .into_tuple::<i64>()
                        .all(db)
                        .await?
                }
                SchoolPopulation::Classes => {
                    active_classes(school_id)
                        .select_only()
                        .column(class::Column::Id)
                        .into_tuple::<i64>()
                        .all(db)
                        .await?
                }
            };
            cache.insert(school_id, ids.into_iter().collect());
        }
        let roster = cache.get(&school_id).map(|ids| (ids.len() as u64, ids.contains(&member_id)));
        let (count, counted) = roster.unwrap_or_default();
        if !counted {
            warn!(school_id, member_id, "Not part of the ranked population, rank 0");
        }
        populations.push(count);
        eligible.push(counted);
    }
    Ok((populations, eligible))
}

fn active_teachers(school_id: i64) -> Select<User> {
    User::find()
        .filter(user::Column::SchoolId.eq(school_id))
        .filter(user::Column::Role.eq(user::ROLE_TEACHER))
        .filter(user::Column::IsActive.eq(true))
        .filter(user::Column::IsDeleted.eq(false))
}

fn active_classes(school_id: i64) -> Select<Class> {
    Class::find()
        .filter(class::Column::SchoolId.eq(school_id))
        .filter(class::Column::IsActive.eq(true))
        .filter(class::Column::IsDeleted.eq(false))
}

/// Number of active, non-deleted teachers in a school.
pub async fn count_active_teachers<C>(db: &C, school_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    active_teachers(school_id).count(db).await.map_err(Into::into)
}

/// Number of active, non-deleted classes in a school.
pub async fn count_active_classes<C>(db: &C, school_id: i64) -> Result<u64>
where
    C: ConnectionTrait,
{
    active_classes(school_id).count(db).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_competition_ranks_skip_after_ties() {
        let scores = [Some(90.0), Some(95.0), Some(90.0), Some(80.0)];
        let ranks = compute_ranks(&scores, RankingScope::Flat, &[]);
        assert_eq!(ranks, vec![2.0, 1.0, 2.0, 4.0]);

        let scores = [Some(50.0), Some(50.0), Some(40.0)];
        assert_eq!(
            compute_ranks(&scores, RankingScope::Flat, &[]),
            vec![1.0, 1.0, 3.0]
        );
    }

    #[test]
    fn test_fractional_ranks_divide_by_population() {
        let scores = [Some(60.0), Some(90.0), Some(75.0)];
        let ranks = compute_ranks(&scores, RankingScope::StudentInClass, &[4, 4, 4]);
        assert_eq!(ranks, vec![0.75, 0.25, 0.5]);
    }

    #[test]
    fn test_fractional_ranks_are_not_tie_safe() {
        let scores = [Some(70.0), Some(70.0), Some(70.0)];
        let ranks = compute_ranks(&scores, RankingScope::StudentInClass, &[3, 3, 3]);
        assert_eq!(ranks, vec![0.3333, 0.6667, 1.0]);
        for rank in &ranks {
            assert!((0.0..=1.0).contains(rank));
        }
    }

    #[test]
    fn test_empty_population_ranks_zero() {
        let scores = [Some(70.0), Some(60.0)];
        let ranks = compute_ranks(&scores, RankingScope::TeacherInSchool, &[0, 0]);
        assert_eq!(ranks, vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_scores_rank_zero_and_are_skipped() {
        let scores = [None, Some(10.0), Some(f64::NAN).filter(|s| s.is_finite()), Some(20.0)];
        let ranks = compute_ranks(&scores, RankingScope::Flat, &[]);
        assert_eq!(ranks, vec![0.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_score_fallback_order() {
        let teacher = TeacherAggregate {
            teacher_id: 1,
            total_students: 2,
            average_score: 55.0,
            competency_rate: 50.0,
        };
        assert_eq!(teacher.rank_score(), Some(55.0));

        let class = ClassAggregate {
            class_id: 1,
            student_count: 2,
            total_score: 120.0,
            average_score: 60.0,
        };
        assert_eq!(class.rank_score(), Some(120.0));
    }

    #[tokio::test]
    async fn test_rank_report_cards_by_class_population() -> Result<()> {
        let fx = setup_school().await?;
        let a = create_report_card(&fx.db, &fx, 1, Some(fx.terms[0].id), 150.0).await?;
        let b = create_report_card(&fx.db, &fx, 2, Some(fx.terms[0].id), 180.0).await?;
        let c = create_report_card(&fx.db, &fx, 3, Some(fx.terms[0].id), 120.0).await?;
        // A fourth card in the class that is not part of the ranked list
        create_report_card(&fx.db, &fx, 4, Some(fx.terms[0].id), 10.0).await?;

        let ranked = rank_report_cards(&fx.db, vec![a, b, c], RankingScope::StudentInClass)
            .await
            .unwrap();
        assert_eq!(ranked[0].rank, 0.5);
        assert_eq!(ranked[1].rank, 0.25);
        assert_eq!(ranked[2].rank, 0.75);

        let stored = ReportCard::find_by_id(ranked[1].id).one(&fx.db).await?.unwrap();
        assert_eq!(stored.rank, 0.25);
        Ok(())
    }

    #[tokio::test]
    async fn test_rank_write_back_failure_returns_partial_list() -> Result<()> {
        let fx = setup_school().await?;
        let a = create_report_card(&fx.db, &fx, 1, None, 100.0).await?;
        let b = create_report_card(&fx.db, &fx, 2, None, 90.0).await?;
        let mut ghost = b.clone();
        ghost.id = 9999;

        let failure = rank_report_cards(&fx.db, vec![a, ghost, b], RankingScope::Flat)
            .await
            .unwrap_err();
        assert_eq!(failure.entities.len(), 3);
        assert_eq!(failure.entities[0].rank, 1.0);
        assert_eq!(failure.entities[1].id, 9999);
        assert!(matches!(
            failure.error,
            Error::Ranking { ranked: 1, total: 3, .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_teacher_population_counts_active_teachers_only() -> Result<()> {
        let fx = setup_school().await?;
        create_test_teacher(&fx.db, &fx, "Active One").await?;
        create_test_teacher(&fx.db, &fx, "Active Two").await?;
        let retired = create_test_teacher(&fx.db, &fx, "Retired").await?;
        let mut active: user::ActiveModel = retired.into();
        active.is_active = Set(false);
        active.update(&fx.db).await?;

        assert_eq!(count_active_teachers(&fx.db, fx.school.id).await?, 2);
        Ok(())
    }

    async fn insert_teacher_report(fx: &Fixture, teacher_id: i64, average_score: f64) -> Result<teacher_report::Model> {
        Ok(teacher_report::ActiveModel {
            teacher_id: Set(teacher_id),
            school_id: Set(fx.school.id),
            academic_year: Set(TEST_YEAR.to_string()),
            term_id: Set(None),
            total_students: Set(1),
            average_score: Set(average_score),
            competency_rate: Set(0.0),
            rank: Set(0.0),
            generated_at: Set(test_clock().0),
            ..Default::default()
        }
        .insert(&fx.db)
        .await?)
    }

    #[tokio::test]
    async fn test_inactive_teacher_is_left_out_of_teacher_ranking() -> Result<()> {
        let fx = setup_school().await?;
        let current = create_test_teacher(&fx.db, &fx, "Current").await?;
        let retired = create_test_teacher(&fx.db, &fx, "Retired").await?;
        let mut active: user::ActiveModel = retired.clone().into();
        active.is_active = Set(false);
        active.update(&fx.db).await?;

        let reports = vec![
            insert_teacher_report(&fx, retired.id, 90.0).await?,
            insert_teacher_report(&fx, current.id, 60.0).await?,
        ];
        let ranked = rank_teacher_reports(&fx.db, reports).await.unwrap();

        assert_eq!(ranked[0].rank, 0.0);
        assert_eq!(ranked[1].rank, 1.0);
        for report in &ranked {
            assert!((0.0..=1.0).contains(&report.rank));
        }
        Ok(())
    }
}
