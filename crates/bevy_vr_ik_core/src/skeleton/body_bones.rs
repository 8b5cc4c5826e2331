use bevy_log::debug;
use bevy_reflect::{Reflect, std_traits::ReflectDefault};
use serde::{Deserialize, Serialize};

use super::Skeleton;
use crate::errors::ConfigurationError;

#[derive(Reflect, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn name(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    /// Sign of this side along the character's `+X` axis.
    pub fn sign(self) -> f32 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// The flat slot layout the body solver reads from and writes to.
#[derive(Reflect, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodySlot {
    Root,
    Pelvis,
    Spine,
    Chest,
    Neck,
    Head,
    LeftShoulder,
    LeftUpperArm,
    LeftForearm,
    LeftHand,
    RightShoulder,
    RightUpperArm,
    RightForearm,
    RightHand,
    LeftThigh,
    LeftCalf,
    LeftFoot,
    LeftToes,
    RightThigh,
    RightCalf,
    RightFoot,
    RightToes,
}

impl BodySlot {
    pub const COUNT: usize = 22;

    pub const ALL: [BodySlot; Self::COUNT] = [
        BodySlot::Root,
        BodySlot::Pelvis,
        BodySlot::Spine,
        BodySlot::Chest,
        BodySlot::Neck,
        BodySlot::Head,
        BodySlot::LeftShoulder,
        BodySlot::LeftUpperArm,
        BodySlot::LeftForearm,
        BodySlot::LeftHand,
        BodySlot::RightShoulder,
        BodySlot::RightUpperArm,
        BodySlot::RightForearm,
        BodySlot::RightHand,
        BodySlot::LeftThigh,
        BodySlot::LeftCalf,
        BodySlot::LeftFoot,
        BodySlot::LeftToes,
        BodySlot::RightThigh,
        BodySlot::RightCalf,
        BodySlot::RightFoot,
        BodySlot::RightToes,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_required(self) -> bool {
        matches!(
            self,
            BodySlot::Root
                | BodySlot::Pelvis
                | BodySlot::Spine
                | BodySlot::Head
                | BodySlot::LeftUpperArm
                | BodySlot::LeftForearm
                | BodySlot::LeftHand
                | BodySlot::RightUpperArm
                | BodySlot::RightForearm
                | BodySlot::RightHand
        )
    }

    /// Slot whose bone stands in when this optional slot is unassigned.
    pub fn fallback(self) -> Option<BodySlot> {
        match self {
            BodySlot::Chest => Some(BodySlot::Spine),
            BodySlot::Neck => Some(BodySlot::Chest),
            BodySlot::LeftShoulder => Some(BodySlot::LeftUpperArm),
            BodySlot::RightShoulder => Some(BodySlot::RightUpperArm),
            BodySlot::LeftToes => Some(BodySlot::LeftFoot),
            BodySlot::RightToes => Some(BodySlot::RightFoot),
            _ => None,
        }
    }

    /// `[shoulder, upper arm, forearm, hand]`
    pub fn arm(side: Side) -> [BodySlot; 4] {
        match side {
            Side::Left => [
                BodySlot::LeftShoulder,
                BodySlot::LeftUpperArm,
                BodySlot::LeftForearm,
                BodySlot::LeftHand,
            ],
            Side::Right => [
                BodySlot::RightShoulder,
                BodySlot::RightUpperArm,
                BodySlot::RightForearm,
                BodySlot::RightHand,
            ],
        }
    }

    /// `[thigh, calf, foot, toes]`
    pub fn leg(side: Side) -> [BodySlot; 4] {
        match side {
            Side::Left => [
                BodySlot::LeftThigh,
                BodySlot::LeftCalf,
                BodySlot::LeftFoot,
                BodySlot::LeftToes,
            ],
            Side::Right => [
                BodySlot::RightThigh,
                BodySlot::RightCalf,
                BodySlot::RightFoot,
                BodySlot::RightToes,
            ],
        }
    }
}

/// Which skeleton bone plays which part of the body.
///
/// Root, pelvis, spine, head and both arms (upper arm, forearm and hand) are
/// required. Legs are all-or-nothing. Chest, neck, shoulders and toes are
/// optional.
#[derive(Reflect, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(default)]
pub struct BodyBones {
    pub root: Option<usize>,
    pub pelvis: Option<usize>,
    pub spine: Option<usize>,
    pub chest: Option<usize>,
    pub neck: Option<usize>,
    pub head: Option<usize>,
    pub left_shoulder: Option<usize>,
    pub left_upper_arm: Option<usize>,
    pub left_forearm: Option<usize>,
    pub left_hand: Option<usize>,
    pub right_shoulder: Option<usize>,
    pub right_upper_arm: Option<usize>,
    pub right_forearm: Option<usize>,
    pub right_hand: Option<usize>,
    pub left_thigh: Option<usize>,
    pub left_calf: Option<usize>,
    pub left_foot: Option<usize>,
    pub left_toes: Option<usize>,
    pub right_thigh: Option<usize>,
    pub right_calf: Option<usize>,
    pub right_foot: Option<usize>,
    pub right_toes: Option<usize>,
}

impl BodyBones {
    fn slot_ref(&mut self, slot: BodySlot) -> &mut Option<usize> {
        match slot {
            BodySlot::Root => &mut self.root,
            BodySlot::Pelvis => &mut self.pelvis,
            BodySlot::Spine => &mut self.spine,
            BodySlot::Chest => &mut self.chest,
            BodySlot::Neck => &mut self.neck,
            BodySlot::Head => &mut self.head,
            BodySlot::LeftShoulder => &mut self.left_shoulder,
            BodySlot::LeftUpperArm => &mut self.left_upper_arm,
            BodySlot::LeftForearm => &mut self.left_forearm,
            BodySlot::LeftHand => &mut self.left_hand,
            BodySlot::RightShoulder => &mut self.right_shoulder,
            BodySlot::RightUpperArm => &mut self.right_upper_arm,
            BodySlot::RightForearm => &mut self.right_forearm,
            BodySlot::RightHand => &mut self.right_hand,
            BodySlot::LeftThigh => &mut self.left_thigh,
            BodySlot::LeftCalf => &mut self.left_calf,
            BodySlot::LeftFoot => &mut self.left_foot,
            BodySlot::LeftToes => &mut self.left_toes,
            BodySlot::RightThigh => &mut self.right_thigh,
            BodySlot::RightCalf => &mut self.right_calf,
            BodySlot::RightFoot => &mut self.right_foot,
            BodySlot::RightToes => &mut self.right_toes,
        }
    }

    pub fn get(&self, slot: BodySlot) -> Option<usize> {
        match slot {
            BodySlot::Root => self.root,
            BodySlot::Pelvis => self.pelvis,
            BodySlot::Spine => self.spine,
            BodySlot::Chest => self.chest,
            BodySlot::Neck => self.neck,
            BodySlot::Head => self.head,
            BodySlot::LeftShoulder => self.left_shoulder,
            BodySlot::LeftUpperArm => self.left_upper_arm,
            BodySlot::LeftForearm => self.left_forearm,
            BodySlot::LeftHand => self.left_hand,
            BodySlot::RightShoulder => self.right_shoulder,
            BodySlot::RightUpperArm => self.right_upper_arm,
            BodySlot::RightForearm => self.right_forearm,
            BodySlot::RightHand => self.right_hand,
            BodySlot::LeftThigh => self.left_thigh,
            BodySlot::LeftCalf => self.left_calf,
            BodySlot::LeftFoot => self.left_foot,
            BodySlot::LeftToes => self.left_toes,
            BodySlot::RightThigh => self.right_thigh,
            BodySlot::RightCalf => self.right_calf,
            BodySlot::RightFoot => self.right_foot,
            BodySlot::RightToes => self.right_toes,
        }
    }

    pub fn set(&mut self, slot: BodySlot, bone: Option<usize>) {
        *self.slot_ref(slot) = bone;
    }

    pub fn with(mut self, slot: BodySlot, bone: usize) -> Self {
        self.set(slot, Some(bone));
        self
    }

    /// Bone for `slot`, following fallbacks for unassigned optional slots.
    pub fn resolve(&self, slot: BodySlot) -> Option<usize> {
        let mut current = slot;
        loop {
            if let Some(bone) = self.get(current) {
                return Some(bone);
            }
            current = current.fallback()?;
        }
    }

    pub fn has_legs(&self) -> bool {
        self.left_thigh.is_some()
    }

    pub fn has_toes(&self) -> bool {
        self.left_toes.is_some() && self.right_toes.is_some()
    }

    /// Checks the mapping against `skeleton`. A mapping that passes can be
    /// solved every frame without further checks.
    pub fn validate(&self, skeleton: &Skeleton) -> Result<(), ConfigurationError> {
        if skeleton.is_empty() {
            return Err(ConfigurationError::EmptySkeleton);
        }

        for slot in BodySlot::ALL {
            if slot.is_required() && self.get(slot).is_none() {
                return Err(ConfigurationError::MissingBone(slot));
            }
        }

        let legs = [
            self.left_thigh,
            self.left_calf,
            self.left_foot,
            self.right_thigh,
            self.right_calf,
            self.right_foot,
        ];
        let assigned_legs = legs.iter().filter(|b| b.is_some()).count();
        if assigned_legs != 0 && assigned_legs != legs.len() {
            return Err(ConfigurationError::IncompleteLegs);
        }
        if self.left_toes.is_some() != self.right_toes.is_some()
            || (self.left_toes.is_some() && assigned_legs == 0)
        {
            return Err(ConfigurationError::IncompleteToes);
        }

        let len = skeleton.len();
        let assigned: Vec<(BodySlot, usize)> = BodySlot::ALL
            .iter()
            .filter_map(|&slot| self.get(slot).map(|bone| (slot, bone)))
            .collect();
        for (i, &(slot, index)) in assigned.iter().enumerate() {
            if index >= len {
                return Err(ConfigurationError::BoneIndexOutOfRange { slot, index, len });
            }
            if let Some(&(first, _)) = assigned[..i].iter().find(|(_, other)| *other == index) {
                return Err(ConfigurationError::DuplicateBoneReference {
                    first,
                    second: slot,
                    index,
                });
            }
        }

        let mut chains: Vec<Vec<BodySlot>> = vec![vec![
            BodySlot::Root,
            BodySlot::Pelvis,
            BodySlot::Spine,
            BodySlot::Chest,
            BodySlot::Neck,
            BodySlot::Head,
        ]];
        for side in Side::BOTH {
            let mut arm = vec![BodySlot::Spine];
            arm.extend(BodySlot::arm(side));
            chains.push(arm);
            if assigned_legs > 0 {
                let mut leg = vec![BodySlot::Root];
                leg.extend(BodySlot::leg(side));
                chains.push(leg);
            }
        }

        for chain in chains {
            let mut previous: Option<(BodySlot, usize)> = None;
            for slot in chain {
                let Some(bone) = self.get(slot) else {
                    continue;
                };
                if let Some((ancestor, ancestor_bone)) = previous
                    && !skeleton.is_descendant(bone, ancestor_bone)
                {
                    return Err(ConfigurationError::BrokenHierarchy { slot, ancestor });
                }
                previous = Some((slot, bone));
            }
        }

        Ok(())
    }

    /// Guesses the mapping from bone names. Understands the usual conventions
    /// (`Hips`/`Pelvis`, `LeftHand`/`hand_l`/`Hand.L`, `Clavicle`, ...).
    pub fn auto_detect(skeleton: &Skeleton) -> Result<Self, ConfigurationError> {
        let names: Vec<String> = skeleton
            .bones()
            .iter()
            .map(|b| b.name.to_lowercase())
            .collect();

        let shallowest = |filter: &dyn Fn(usize, &str) -> bool| -> Option<usize> {
            (0..names.len())
                .filter(|&i| filter(i, &names[i]))
                .min_by_key(|&i| skeleton.depth(i))
        };

        let head = shallowest(&|_, n| n.contains("head") && side_of(n).is_none())
            .ok_or(ConfigurationError::DetectionFailed(BodySlot::Head))?;
        let pelvis = shallowest(&|i, n| {
            (n.contains("hips") || n.contains("pelvis")) && skeleton.is_descendant(head, i)
        })
        .ok_or(ConfigurationError::DetectionFailed(BodySlot::Pelvis))?;

        let mut root = skeleton
            .parent(pelvis)
            .ok_or(ConfigurationError::DetectionFailed(BodySlot::Root))?;
        while let Some(parent) = skeleton.parent(root) {
            root = parent;
        }

        // Bones strictly between pelvis and head, top-down
        let mut torso = vec![];
        let mut current = skeleton.parent(head);
        while let Some(bone) = current {
            if bone == pelvis {
                break;
            }
            torso.push(bone);
            current = skeleton.parent(bone);
        }
        torso.reverse();

        let mut bones = BodyBones {
            root: Some(root),
            pelvis: Some(pelvis),
            head: Some(head),
            ..Default::default()
        };
        if let Some(&last) = torso.last()
            && names[last].contains("neck")
        {
            bones.neck = Some(last);
            torso.pop();
        }
        bones.spine = Some(
            *torso
                .first()
                .ok_or(ConfigurationError::DetectionFailed(BodySlot::Spine))?,
        );
        if torso.len() > 1 {
            bones.chest = torso.last().copied();
        }

        for side in Side::BOTH {
            let [shoulder, upper_arm, forearm, hand] = BodySlot::arm(side);
            let hand_bone = shallowest(&|_, n| {
                (n.contains("hand") || n.contains("wrist"))
                    && !is_finger(n)
                    && side_of(n) == Some(side)
            })
            .ok_or(ConfigurationError::DetectionFailed(hand))?;
            let forearm_bone = skeleton
                .parent(hand_bone)
                .ok_or(ConfigurationError::DetectionFailed(forearm))?;
            let upper_arm_bone = skeleton
                .parent(forearm_bone)
                .ok_or(ConfigurationError::DetectionFailed(upper_arm))?;
            bones.set(hand, Some(hand_bone));
            bones.set(forearm, Some(forearm_bone));
            bones.set(upper_arm, Some(upper_arm_bone));
            if let Some(parent) = skeleton.parent(upper_arm_bone)
                && ["shoulder", "clavicle", "collar"]
                    .iter()
                    .any(|k| names[parent].contains(k))
            {
                bones.set(shoulder, Some(parent));
            }
        }

        let feet: Vec<Option<usize>> = Side::BOTH
            .iter()
            .map(|&side| {
                shallowest(&|_, n| {
                    (n.contains("foot") || n.contains("ankle")) && side_of(n) == Some(side)
                })
            })
            .collect();
        match (feet[0], feet[1]) {
            (Some(left), Some(right)) => {
                for (side, foot_bone) in [(Side::Left, left), (Side::Right, right)] {
                    let [thigh, calf, foot, toes] = BodySlot::leg(side);
                    let calf_bone = skeleton
                        .parent(foot_bone)
                        .ok_or(ConfigurationError::DetectionFailed(calf))?;
                    let thigh_bone = skeleton
                        .parent(calf_bone)
                        .ok_or(ConfigurationError::DetectionFailed(thigh))?;
                    bones.set(foot, Some(foot_bone));
                    bones.set(calf, Some(calf_bone));
                    bones.set(thigh, Some(thigh_bone));
                    bones.set(
                        toes,
                        skeleton
                            .children(foot_bone)
                            .iter()
                            .copied()
                            .find(|&c| names[c].contains("toe") || names[c].contains("ball")),
                    );
                }
                if !bones.has_toes() {
                    bones.left_toes = None;
                    bones.right_toes = None;
                }
            }
            (None, None) => {}
            (None, Some(_)) => return Err(ConfigurationError::DetectionFailed(BodySlot::LeftFoot)),
            (Some(_), None) => return Err(ConfigurationError::DetectionFailed(BodySlot::RightFoot)),
        }

        bones.validate(skeleton)?;
        debug!("Detected body bones: {:?}", bones);
        Ok(bones)
    }
}

fn is_finger(name: &str) -> bool {
    ["thumb", "index", "middle", "ring", "pinky", "little", "finger"]
        .iter()
        .any(|k| name.contains(k))
}

/// Side marker in a lowercase bone name.
fn side_of(name: &str) -> Option<Side> {
    let marked = |c: char| {
        let prefixes = [format!("{c}_"), format!("{c}."), format!("{c} ")];
        let suffixes = [format!("_{c}"), format!(".{c}"), format!(" {c}")];
        let infixes = [format!("_{c}_"), format!(".{c}."), format!(":{c}_")];
        prefixes.iter().any(|p| name.starts_with(p.as_str()))
            || suffixes.iter().any(|s| name.ends_with(s.as_str()))
            || infixes.iter().any(|i| name.contains(i.as_str()))
    };
    if name.contains("left") || marked('l') {
        Some(Side::Left)
    } else if name.contains("right") || marked('r') {
        Some(Side::Right)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use bevy_math::Vec3;

    use super::*;
    use crate::skeleton::BoneTransform;

    fn add(skeleton: &mut Skeleton, name: &str, parent: Option<usize>, offset: Vec3) -> usize {
        skeleton
            .add_bone(name, parent, BoneTransform::from_translation(offset))
            .unwrap()
    }

    fn humanoid() -> Skeleton {
        let mut s = Skeleton::new();
        let root = add(&mut s, "Armature", None, Vec3::ZERO);
        let hips = add(&mut s, "mixamorig:Hips", Some(root), Vec3::new(0.0, 1.0, 0.0));
        let spine = add(&mut s, "mixamorig:Spine", Some(hips), Vec3::new(0.0, 0.1, 0.0));
        let chest = add(&mut s, "mixamorig:Spine2", Some(spine), Vec3::new(0.0, 0.2, 0.0));
        let neck = add(&mut s, "mixamorig:Neck", Some(chest), Vec3::new(0.0, 0.2, 0.0));
        add(&mut s, "mixamorig:Head", Some(neck), Vec3::new(0.0, 0.1, 0.0));
        for (side, x) in [("Left", 1.0), ("Right", -1.0)] {
            let shoulder = add(&mut s, &format!("mixamorig:{side}Shoulder"), Some(chest), Vec3::new(0.05 * x, 0.15, 0.0));
            let arm = add(&mut s, &format!("mixamorig:{side}Arm"), Some(shoulder), Vec3::new(0.1 * x, 0.0, 0.0));
            let forearm = add(&mut s, &format!("mixamorig:{side}ForeArm"), Some(arm), Vec3::new(0.25 * x, 0.0, 0.0));
            let hand = add(&mut s, &format!("mixamorig:{side}Hand"), Some(forearm), Vec3::new(0.25 * x, 0.0, 0.0));
            add(&mut s, &format!("mixamorig:{side}HandThumb1"), Some(hand), Vec3::new(0.02 * x, 0.0, 0.03));
            let thigh = add(&mut s, &format!("mixamorig:{side}UpLeg"), Some(hips), Vec3::new(0.1 * x, -0.05, 0.0));
            let calf = add(&mut s, &format!("mixamorig:{side}Leg"), Some(thigh), Vec3::new(0.0, -0.45, 0.0));
            let foot = add(&mut s, &format!("mixamorig:{side}Foot"), Some(calf), Vec3::new(0.0, -0.45, 0.0));
            add(&mut s, &format!("mixamorig:{side}ToeBase"), Some(foot), Vec3::new(0.0, -0.05, 0.12));
        }
        s
    }

    #[test]
    fn test_side_markers() {
        assert_eq!(side_of("lefthand"), Some(Side::Left));
        assert_eq!(side_of("hand_r"), Some(Side::Right));
        assert_eq!(side_of("hand.l"), Some(Side::Left));
        assert_eq!(side_of("bip01 r hand"), Some(Side::Right));
        assert_eq!(side_of("spine"), None);
        assert_eq!(side_of("pelvis"), None);
    }

    #[test]
    fn test_auto_detect_mixamo_names() {
        let skeleton = humanoid();
        let bones = BodyBones::auto_detect(&skeleton).unwrap();

        let name = |slot| skeleton.name(bones.get(slot).unwrap()).unwrap();
        assert_eq!(name(BodySlot::Root), "Armature");
        assert_eq!(name(BodySlot::Pelvis), "mixamorig:Hips");
        assert_eq!(name(BodySlot::Spine), "mixamorig:Spine");
        assert_eq!(name(BodySlot::Chest), "mixamorig:Spine2");
        assert_eq!(name(BodySlot::Neck), "mixamorig:Neck");
        assert_eq!(name(BodySlot::LeftShoulder), "mixamorig:LeftShoulder");
        assert_eq!(name(BodySlot::RightHand), "mixamorig:RightHand");
        assert_eq!(name(BodySlot::LeftThigh), "mixamorig:LeftUpLeg");
        assert_eq!(name(BodySlot::RightToes), "mixamorig:RightToeBase");
    }

    #[test]
    fn test_missing_required_bone() {
        let skeleton = humanoid();
        let mut bones = BodyBones::auto_detect(&skeleton).unwrap();
        bones.head = None;
        assert_eq!(
            bones.validate(&skeleton),
            Err(ConfigurationError::MissingBone(BodySlot::Head))
        );
    }

    #[test]
    fn test_incomplete_legs() {
        let skeleton = humanoid();
        let mut bones = BodyBones::auto_detect(&skeleton).unwrap();
        bones.right_calf = None;
        assert_eq!(bones.validate(&skeleton), Err(ConfigurationError::IncompleteLegs));
    }

    #[test]
    fn test_duplicates_and_range() {
        let skeleton = humanoid();
        let mut bones = BodyBones::auto_detect(&skeleton).unwrap();
        bones.chest = bones.spine;
        assert!(matches!(
            bones.validate(&skeleton),
            Err(ConfigurationError::DuplicateBoneReference { .. })
        ));

        let mut bones = BodyBones::auto_detect(&skeleton).unwrap();
        bones.left_toes = Some(999);
        assert!(matches!(
            bones.validate(&skeleton),
            Err(ConfigurationError::BoneIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_broken_hierarchy() {
        let skeleton = humanoid();
        let mut bones = BodyBones::auto_detect(&skeleton).unwrap();
        std::mem::swap(&mut bones.left_forearm, &mut bones.left_hand);
        assert!(matches!(
            bones.validate(&skeleton),
            Err(ConfigurationError::BrokenHierarchy { .. })
        ));
    }

    #[test]
    fn test_fallbacks() {
        let skeleton = humanoid();
        let mut bones = BodyBones::auto_detect(&skeleton).unwrap();
        bones.chest = None;
        bones.neck = None;
        assert_eq!(bones.resolve(BodySlot::Neck), bones.spine);
        assert_eq!(bones.resolve(BodySlot::Head), bones.head);
        bones.left_toes = None;
        assert_eq!(bones.resolve(BodySlot::LeftToes), bones.left_foot);
    }
}
