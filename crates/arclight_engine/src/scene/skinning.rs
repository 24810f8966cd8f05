//! Skeleton and animation playback state
//!
//! Skeletons and clips arrive as pre-built resources registered by GUID.
//! An entity's skinning state only moves forward:
//! `NoSkeleton -> SkeletonLoading -> SkeletonReady -> Posed`, with the
//! single backward edge `Posed -> SkeletonReady` when every clip stops.

use std::collections::HashMap;

/// Skinning state machine for a drawable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkinningState {
    /// Mesh has no skeleton, or posing was never requested
    NoSkeleton,
    /// Skeleton resource requested but not yet available
    SkeletonLoading,
    /// Skeleton bound, no clips playing
    SkeletonReady,
    /// At least one clip is playing
    Posed,
}

/// A single animation clip description
#[derive(Debug, Clone)]
pub struct AnimationClip {
    /// Resource GUID of the clip
    pub guid: u64,
    /// Clip length in seconds
    pub duration: f32,
}

/// A skeleton resource with its authored clips
#[derive(Debug, Clone)]
pub struct Skeleton {
    /// Resource GUID of the skeleton
    pub guid: u64,
    /// Number of joints
    pub joint_count: u32,
    /// Clips authored against this skeleton
    pub clips: Vec<AnimationClip>,
}

/// Registry of loaded skeleton resources, keyed by GUID
#[derive(Debug, Default)]
pub struct SkeletonLibrary {
    skeletons: HashMap<u64, Skeleton>,
}

impl SkeletonLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loaded skeleton resource
    pub fn register(&mut self, skeleton: Skeleton) {
        self.skeletons.insert(skeleton.guid, skeleton);
    }

    /// Look up a skeleton by GUID
    pub fn get(&self, guid: u64) -> Option<&Skeleton> {
        self.skeletons.get(&guid)
    }

    /// Whether a skeleton resource is available
    pub fn is_available(&self, guid: u64) -> bool {
        self.skeletons.contains_key(&guid)
    }
}

/// An actively playing clip
#[derive(Debug, Clone)]
pub struct ClipPlayback {
    /// Clip GUID
    pub clip: u64,
    /// Blend weight
    pub weight: f32,
    /// Whether the clip wraps at its end
    pub looping: bool,
    /// Playback position in seconds
    pub time: f32,
    duration: f32,
}

/// Pose and playback state owned by a skinned entity
#[derive(Debug)]
pub struct PoseState {
    /// GUID of the bound skeleton
    pub skeleton: u64,
    /// Number of joints in the bound skeleton
    pub joint_count: u32,
    playing: Vec<ClipPlayback>,
    state: SkinningState,
}

impl PoseState {
    /// Bind a skeleton; enters `SkeletonReady`
    pub fn new(skeleton: &Skeleton) -> Self {
        Self {
            skeleton: skeleton.guid,
            joint_count: skeleton.joint_count,
            playing: Vec::new(),
            state: SkinningState::SkeletonReady,
        }
    }

    /// Current state-machine state
    pub fn state(&self) -> SkinningState {
        self.state
    }

    /// Clips currently playing
    pub fn playing(&self) -> &[ClipPlayback] {
        &self.playing
    }

    /// Start a clip; enters `Posed`
    pub fn play(&mut self, clip: &AnimationClip, weight: f32, looping: bool) {
        self.playing.push(ClipPlayback {
            clip: clip.guid,
            weight,
            looping,
            time: 0.0,
            duration: clip.duration,
        });
        self.state = SkinningState::Posed;
    }

    /// Advance playback; finished non-looping clips are dropped and the
    /// state falls back to `SkeletonReady` when none remain
    pub fn advance(&mut self, dt: f32) {
        for clip in &mut self.playing {
            clip.time += dt;
            if clip.looping && clip.duration > 0.0 {
                clip.time %= clip.duration;
            }
        }
        self.playing
            .retain(|clip| clip.looping || clip.time < clip.duration);
        if self.playing.is_empty() && self.state == SkinningState::Posed {
            self.state = SkinningState::SkeletonReady;
        }
    }
}
