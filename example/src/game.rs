// SPDX-FileCopyrightText: 2025 Jens Pitkänen <jens.pitkanen@helsinki.fi>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::ops::ControlFlow;

use engine::{
    jobs::{Job, JobFlags, JobGroup, JobPriority, JobState, JobSubmitter, JobSystem, ResultJob},
    Game, UpdateTime,
};
use platform::Platform;
use tracing::{debug, info, warn};

/// How many frames apart new chunks of terrain are generated.
const CHUNK_INTERVAL: u64 = 20;
const CHUNK_SIZE: usize = 64 * 64;
const PHYSICS_SUBSTEPS: usize = 4;

/// A chunk of terrain being built by a chain of jobs: the heights are
/// generated in the background, checksummed in the background, then
/// "uploaded" on the main thread.
struct PendingChunk {
    index: u64,
    checksum: ResultJob<u64>,
    upload: Job,
}

pub struct ExampleGame {
    frame: u64,
    fixed_ticks: u64,
    pending_chunks: Vec<PendingChunk>,
    uploaded_chunks: u64,
    failed_chunks: u64,
    submitter: JobSubmitter,
}

impl Game for ExampleGame {
    type InitParams = ();

    fn init(_params: Self::InitParams, jobs: &JobSystem) -> Self {
        info!(
            "Example game starting with {} background workers.",
            jobs.worker_count(),
        );
        ExampleGame {
            frame: 0,
            fixed_ticks: 0,
            pending_chunks: Vec::new(),
            uploaded_chunks: 0,
            failed_chunks: 0,
            submitter: jobs.submitter(),
        }
    }

    fn fixed_update(&mut self, _time: UpdateTime, jobs: &JobSystem) {
        self.fixed_ticks += 1;
        let physics = JobGroup::new("Physics Substeps");
        for substep in 0..PHYSICS_SUBSTEPS {
            physics.add_job(Job::from_fn(format!("Physics Substep {substep}"), |_| {
                let mut velocity = 1.0f32;
                for _ in 0..1000 {
                    velocity *= 0.999;
                }
                core::hint::black_box(velocity);
            }));
        }
        jobs.add_job(physics);
    }

    fn run_frame(
        &mut self,
        time: UpdateTime,
        jobs: &mut JobSystem,
        _platform: &dyn Platform,
    ) -> ControlFlow<()> {
        if self.frame % CHUNK_INTERVAL == 0 {
            let chunk = self.spawn_chunk(jobs, self.frame / CHUNK_INTERVAL);
            self.pending_chunks.push(chunk);
        }
        self.collect_chunks();

        if self.frame % 60 == 0 {
            let stats = jobs.last_frame_stats();
            info!(
                "Frame {} ({:?} in): {} jobs succeeded and {} were canceled last frame, \
                 {} waiting, {} queued on workers. {} chunks uploaded, {} failed, {} fixed ticks.",
                self.frame,
                time.total,
                stats.count(JobState::Succeeded),
                stats.count(JobState::Canceled),
                stats.count(JobState::Pending),
                stats.count(JobState::Running),
                self.uploaded_chunks,
                self.failed_chunks,
                self.fixed_ticks,
            );
        }

        self.frame += 1;
        ControlFlow::Continue(())
    }

    fn shutdown(&mut self, _jobs: &JobSystem) {
        info!(
            "Example game shutting down after {} frames, {} chunks still pending.",
            self.frame,
            self.pending_chunks.len(),
        );
    }
}

impl ExampleGame {
    fn spawn_chunk(&self, jobs: &JobSystem, index: u64) -> PendingChunk {
        let heights = ResultJob::from_fn(format!("Generate Chunk {index}"), move |_| {
            let mut state = index.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
            (0..CHUNK_SIZE)
                .map(|_| {
                    // xorshift
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    (state % 256) as u8
                })
                .collect::<Vec<u8>>()
        });

        let checksum = {
            let heights = heights.clone();
            jobs.add_result_job_fn(
                format!("Checksum Chunk {index}"),
                JobFlags::NONE,
                move |ctx| {
                    let Some(heights) = heights.take_result() else {
                        ctx.cancel();
                        return 0;
                    };
                    heights
                        .iter()
                        .fold(0u64, |sum, &height| sum.rotate_left(5) ^ u64::from(height))
                },
                Some(Box::new(move |checksum: &u64| {
                    debug!("Chunk {index} has checksum {checksum:016x}.");
                })),
            )
        };
        checksum.add_dependency(&heights);

        let upload = {
            let checksum = checksum.clone();
            let submitter = self.submitter.clone();
            Job::builder()
                .name(format!("Upload Chunk {index}"))
                .flags(JobFlags::RUN_ON_MAIN_THREAD)
                .priority(JobPriority::Critical)
                .build_fn(move |ctx| {
                    debug!(
                        "Uploading chunk {index} (checksum {:?}) on {:?}.",
                        checksum.try_result(),
                        ctx.execution(),
                    );
                    if index % 5 == 4 && submitter.is_running() {
                        submitter.add_job(Job::from_fn(format!("Autosave {index}"), |_| {
                            debug!("Autosaving.");
                        }));
                    }
                })
        };
        upload.add_dependency(&checksum);

        // Every seventh chunk gets thrown away before it's done, to show off
        // cancellation propagating down the chain.
        if index % 7 == 6 {
            heights.cancel();
        }

        jobs.add_jobs([heights.job(), &upload]);
        PendingChunk {
            index,
            checksum,
            upload,
        }
    }

    fn collect_chunks(&mut self) {
        let mut uploaded = 0;
        let mut failed = 0;
        self.pending_chunks.retain(|chunk| match chunk.upload.state() {
            JobState::Succeeded => {
                uploaded += 1;
                false
            }
            JobState::Canceled => {
                match chunk.checksum.failure() {
                    Some(failure) => warn!("Chunk {} failed: {failure}", chunk.index),
                    None => debug!("Chunk {} was canceled.", chunk.index),
                }
                failed += 1;
                false
            }
            JobState::Pending | JobState::Running => true,
        });
        self.uploaded_chunks += uploaded;
        self.failed_chunks += failed;
    }
}
