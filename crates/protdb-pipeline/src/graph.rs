//! Job dependency graph
//!
//! A run is the cross product of species and variants for the FASTA grid
//! (`fasta -> decoy -> target-decoy`) plus one category grid per species
//! (`categories -> relations`). The graph is fixed before execution starts
//! and validated for duplicate paths and cycles.

use crate::job::{JobId, JobKey, JobSpec};
use crate::paths::PathResolver;
use protdb_common::types::{DateTag, Species, Stage, Variant};
use protdb_common::{ProtdbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Which sub-grids a run contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grid {
    #[default]
    All,
    /// fasta, decoy and target-decoy jobs only
    Fasta,
    /// categories and relations jobs only
    Categories,
}

impl Grid {
    fn includes_fasta(self) -> bool {
        matches!(self, Grid::All | Grid::Fasta)
    }

    fn includes_categories(self) -> bool {
        matches!(self, Grid::All | Grid::Categories)
    }
}

impl std::str::FromStr for Grid {
    type Err = ProtdbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Grid::All),
            "fasta" => Ok(Grid::Fasta),
            "categories" | "cat" => Ok(Grid::Categories),
            _ => Err(ProtdbError::Config(format!("Invalid grid: {}", s))),
        }
    }
}

/// Validated DAG of jobs
#[derive(Debug, Clone)]
pub struct JobGraph {
    jobs: Vec<JobSpec>,
    dependents: Vec<Vec<JobId>>,
    order: Vec<JobId>,
}

impl JobGraph {
    /// Build the job grid for one run
    ///
    /// Repeated species or variants are ignored with a warning.
    pub fn build(
        species: &[Species],
        variants: &[Variant],
        date_tag: &DateTag,
        resolver: &PathResolver,
        grid: Grid,
    ) -> Result<Self> {
        let species = dedup("species", species);
        let variants = dedup("variant", variants);

        let mut jobs: Vec<JobSpec> = Vec::new();
        let next = |key: JobKey, jobs: &[JobSpec]| {
            JobSpec::new(JobId(jobs.len()), key, date_tag, resolver)
        };

        if grid.includes_fasta() {
            for &s in &species {
                for &v in &variants {
                    let fasta = next(JobKey::new(s, Some(v), Stage::Fasta), &jobs)?;
                    jobs.push(fasta.clone());

                    let decoy =
                        next(JobKey::new(s, Some(v), Stage::Decoy), &jobs)?.depend_on(&fasta);
                    jobs.push(decoy.clone());

                    let target_decoy = next(JobKey::new(s, Some(v), Stage::TargetDecoy), &jobs)?
                        .depend_on(&fasta)
                        .depend_on(&decoy);
                    jobs.push(target_decoy);
                }
            }
        }

        if grid.includes_categories() {
            for &s in &species {
                let categories = next(JobKey::new(s, None, Stage::Categories), &jobs)?;
                jobs.push(categories.clone());

                let relations =
                    next(JobKey::new(s, None, Stage::Relations), &jobs)?.depend_on(&categories);
                jobs.push(relations);
            }
        }

        debug!(
            jobs = jobs.len(),
            species = species.len(),
            variants = variants.len(),
            "Built job grid"
        );

        Self::from_specs(jobs)
    }

    /// Validate an arbitrary set of jobs
    ///
    /// Job ids must equal their position. Fails with `DuplicateJob` when two
    /// jobs share an output or log path and `CyclicDependency` when the edges
    /// do not form a DAG.
    pub fn from_specs(jobs: Vec<JobSpec>) -> Result<Self> {
        let mut dependents: Vec<Vec<JobId>> = vec![Vec::new(); jobs.len()];

        for (index, job) in jobs.iter().enumerate() {
            if job.id != JobId(index) {
                return Err(ProtdbError::Config(format!(
                    "job {} has id {} but sits at position {}",
                    job.key, job.id, index
                )));
            }
            for dep in &job.depends_on {
                let upstream = dependents.get_mut(dep.0).ok_or_else(|| {
                    ProtdbError::Config(format!("job {} depends on unknown job {}", job.key, dep))
                })?;
                upstream.push(job.id);
            }
        }

        check_unique_paths(&jobs)?;
        let order = topological_order(&jobs, &dependents)?;

        Ok(Self {
            jobs,
            dependents,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs(&self) -> &[JobSpec] {
        &self.jobs
    }

    pub fn job(&self, id: JobId) -> &JobSpec {
        &self.jobs[id.0]
    }

    pub fn find(&self, key: &JobKey) -> Option<&JobSpec> {
        self.jobs.iter().find(|job| &job.key == key)
    }

    /// Jobs that list `id` as a dependency
    pub fn dependents(&self, id: JobId) -> &[JobId] {
        &self.dependents[id.0]
    }

    /// Every job after all of its dependencies
    pub fn topological_order(&self) -> &[JobId] {
        &self.order
    }

    /// Jobs grouped by longest distance from a root
    ///
    /// Jobs in one level never depend on each other.
    pub fn levels(&self) -> Vec<Vec<JobId>> {
        let mut level = vec![0usize; self.jobs.len()];
        for &id in &self.order {
            level[id.0] = self
                .job(id)
                .depends_on
                .iter()
                .map(|dep| level[dep.0] + 1)
                .max()
                .unwrap_or(0);
        }

        let depth = level.iter().copied().max().map_or(0, |max| max + 1);
        let mut levels = vec![Vec::new(); depth];
        for &id in &self.order {
            levels[level[id.0]].push(id);
        }
        levels
    }

    /// Every distinct directory a run writes into
    pub fn directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .jobs
            .iter()
            .flat_map(|job| [job.output_path.parent(), job.log_path.parent()])
            .flatten()
            .map(PathBuf::from)
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }
}

fn dedup<T: Copy + PartialEq + std::fmt::Display>(what: &str, items: &[T]) -> Vec<T> {
    let mut unique: Vec<T> = Vec::with_capacity(items.len());
    for &item in items {
        if unique.contains(&item) {
            warn!("Ignoring repeated {} '{}'", what, item);
        } else {
            unique.push(item);
        }
    }
    unique
}

fn check_unique_paths(jobs: &[JobSpec]) -> Result<()> {
    let mut owners: HashMap<&PathBuf, &JobSpec> = HashMap::new();

    for job in jobs {
        for path in [&job.output_path, &job.log_path] {
            if let Some(first) = owners.insert(path, job) {
                return Err(ProtdbError::DuplicateJob {
                    first: first.key.to_string(),
                    second: job.key.to_string(),
                    path: path.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Kahn's algorithm, seeded in id order so the result is deterministic
fn topological_order(jobs: &[JobSpec], dependents: &[Vec<JobId>]) -> Result<Vec<JobId>> {
    let mut in_degree: Vec<usize> = jobs.iter().map(|job| job.depends_on.len()).collect();
    let mut queue: VecDeque<JobId> = jobs
        .iter()
        .filter(|job| job.depends_on.is_empty())
        .map(|job| job.id)
        .collect();
    let mut order = Vec::with_capacity(jobs.len());

    while let Some(id) = queue.pop_front() {
        order.push(id);
        for &dependent in &dependents[id.0] {
            in_degree[dependent.0] -= 1;
            if in_degree[dependent.0] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() < jobs.len() {
        let stuck = jobs
            .iter()
            .filter(|job| in_degree[job.id.0] > 0)
            .map(|job| job.key.to_string())
            .collect();
        return Err(ProtdbError::CyclicDependency(stuck));
    }

    Ok(order)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn tag() -> DateTag {
        "202401".parse().unwrap()
    }

    fn resolver() -> PathResolver {
        PathResolver::new("/out", "/logs")
    }

    fn deps_of(graph: &JobGraph, key: JobKey) -> BTreeSet<JobKey> {
        graph
            .find(&key)
            .unwrap()
            .depends_on
            .iter()
            .map(|id| graph.job(*id).key)
            .collect()
    }

    #[test]
    fn test_single_pair_grid() {
        let graph = JobGraph::build(
            &[Species::Human],
            &[Variant::ProSw],
            &tag(),
            &resolver(),
            Grid::Fasta,
        )
        .unwrap();

        assert_eq!(graph.len(), 3);
        let stages: Vec<Stage> = graph.jobs().iter().map(|j| j.stage()).collect();
        assert_eq!(stages, vec![Stage::Fasta, Stage::Decoy, Stage::TargetDecoy]);
    }

    #[test]
    fn test_full_grid_edges() {
        let species = [Species::Human, Species::Mouse];
        let variants = [Variant::ProSw, Variant::UniSwTr];
        let graph = JobGraph::build(&species, &variants, &tag(), &resolver(), Grid::All).unwrap();

        assert_eq!(graph.len(), 2 * 2 * 3 + 2 * 2);

        for s in species {
            for v in variants {
                let fasta = JobKey::new(s, Some(v), Stage::Fasta);
                let decoy = JobKey::new(s, Some(v), Stage::Decoy);
                let target_decoy = JobKey::new(s, Some(v), Stage::TargetDecoy);

                assert!(deps_of(&graph, fasta).is_empty());
                assert_eq!(deps_of(&graph, decoy), BTreeSet::from([fasta]));
                assert_eq!(deps_of(&graph, target_decoy), BTreeSet::from([fasta, decoy]));
            }

            let categories = JobKey::new(s, None, Stage::Categories);
            let relations = JobKey::new(s, None, Stage::Relations);
            assert!(deps_of(&graph, categories).is_empty());
            assert_eq!(deps_of(&graph, relations), BTreeSet::from([categories]));
        }
    }

    #[test]
    fn test_inputs_follow_dependencies() {
        let graph = JobGraph::build(
            &[Species::Pig],
            &[Variant::UniSw],
            &tag(),
            &resolver(),
            Grid::Fasta,
        )
        .unwrap();

        let target_decoy = graph
            .find(&JobKey::new(Species::Pig, Some(Variant::UniSw), Stage::TargetDecoy))
            .unwrap();
        assert_eq!(
            target_decoy.inputs,
            vec![
                PathBuf::from("/out/202401/pig_202401_uni-sw.fasta"),
                PathBuf::from("/out/202401/pig_202401_uni-sw.decoy.fasta"),
            ]
        );
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let graph = JobGraph::build(
            &Species::ALL,
            &Variant::ALL,
            &tag(),
            &resolver(),
            Grid::All,
        )
        .unwrap();

        let position: HashMap<JobId, usize> = graph
            .topological_order()
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect();

        assert_eq!(position.len(), graph.len());
        for job in graph.jobs() {
            for dep in &job.depends_on {
                assert!(position[dep] < position[&job.id]);
            }
        }
    }

    #[test]
    fn test_levels() {
        let graph = JobGraph::build(
            &[Species::Rat],
            &[Variant::ProSw],
            &tag(),
            &resolver(),
            Grid::All,
        )
        .unwrap();

        let levels: Vec<Vec<Stage>> = graph
            .levels()
            .into_iter()
            .map(|level| level.into_iter().map(|id| graph.job(id).stage()).collect())
            .collect();

        assert_eq!(
            levels,
            vec![
                vec![Stage::Fasta, Stage::Categories],
                vec![Stage::Decoy, Stage::Relations],
                vec![Stage::TargetDecoy],
            ]
        );
    }

    #[test]
    fn test_repeated_inputs_are_ignored() {
        let graph = JobGraph::build(
            &[Species::Human, Species::Human],
            &[Variant::ProSw, Variant::ProSw],
            &tag(),
            &resolver(),
            Grid::All,
        )
        .unwrap();
        assert_eq!(graph.len(), 5);
    }

    #[test]
    fn test_categories_grid_ignores_variants() {
        let graph = JobGraph::build(
            &[Species::Zebrafish],
            &[],
            &tag(),
            &resolver(),
            Grid::Categories,
        )
        .unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(
            graph.directories(),
            vec![PathBuf::from("/logs/202401"), PathBuf::from("/out/202401")]
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let r = resolver();
        let t = tag();
        let mut a = JobSpec::new(
            JobId(0),
            JobKey::new(Species::Human, None, Stage::Categories),
            &t,
            &r,
        )
        .unwrap();
        let b = JobSpec::new(
            JobId(1),
            JobKey::new(Species::Human, None, Stage::Relations),
            &t,
            &r,
        )
        .unwrap()
        .depend_on(&a);
        a = a.depend_on(&b);

        let err = JobGraph::from_specs(vec![a, b]).unwrap_err();
        match err {
            ProtdbError::CyclicDependency(jobs) => assert_eq!(jobs.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_output_is_rejected() {
        let r = resolver();
        let t = tag();
        let fasta = JobSpec::new(
            JobId(0),
            JobKey::new(Species::Human, Some(Variant::ProSw), Stage::Fasta),
            &t,
            &r,
        )
        .unwrap();
        let mut decoy = JobSpec::new(
            JobId(1),
            JobKey::new(Species::Human, Some(Variant::ProSw), Stage::Decoy),
            &t,
            &r,
        )
        .unwrap();
        decoy.output_path = fasta.output_path.clone();

        let err = JobGraph::from_specs(vec![fasta, decoy]).unwrap_err();
        assert!(matches!(err, ProtdbError::DuplicateJob { .. }));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let r = resolver();
        let mut job = JobSpec::new(
            JobId(0),
            JobKey::new(Species::Human, None, Stage::Relations),
            &tag(),
            &r,
        )
        .unwrap();
        job.depends_on.insert(JobId(7));

        assert!(matches!(
            JobGraph::from_specs(vec![job]),
            Err(ProtdbError::Config(_))
        ));
    }

    #[test]
    fn test_grid_from_str() {
        assert_eq!("all".parse::<Grid>().unwrap(), Grid::All);
        assert_eq!("FASTA".parse::<Grid>().unwrap(), Grid::Fasta);
        assert_eq!("categories".parse::<Grid>().unwrap(), Grid::Categories);
        assert!("decoy".parse::<Grid>().is_err());
    }
}
