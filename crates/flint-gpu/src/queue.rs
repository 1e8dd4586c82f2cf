//! Queue family selection.

use ash::vk;

/// Queue family indices used by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
    pub transfer: u32,
}

impl QueueFamilyIndices {
    /// Distinct family indices, ascending.
    pub fn unique(&self) -> Vec<u32> {
        let mut families = vec![self.graphics, self.present, self.transfer];
        families.sort_unstable();
        families.dedup();
        families
    }

    /// Sharing mode for resources touched by every family in use.
    ///
    /// Returns `CONCURRENT` and the distinct indices when the families differ,
    /// `EXCLUSIVE` and an empty list otherwise.
    pub fn sharing(&self) -> (vk::SharingMode, Vec<u32>) {
        let unique = self.unique();
        if unique.len() > 1 {
            (vk::SharingMode::CONCURRENT, unique)
        } else {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        }
    }

    /// Sharing between the transfer and graphics families only.
    pub fn upload_sharing(&self) -> (vk::SharingMode, Vec<u32>) {
        if self.transfer == self.graphics {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        } else {
            (
                vk::SharingMode::CONCURRENT,
                vec![self.graphics.min(self.transfer), self.graphics.max(self.transfer)],
            )
        }
    }
}

/// Pick graphics, present and transfer families.
///
/// Graphics is the first family with `GRAPHICS`. Transfer is the first
/// family with `TRANSFER` but without `GRAPHICS`, falling back to graphics.
/// Present is the first family for which `present_support` returns true; with
/// no surface pass `None` and present shares the graphics family.
pub fn select_queue_families(
    families: &[vk::QueueFamilyProperties],
    present_support: Option<&dyn Fn(u32) -> bool>,
) -> Option<QueueFamilyIndices> {
    let indexed = || (0u32..).zip(families.iter());

    let graphics = indexed()
        .find(|(_, f)| f.queue_count > 0 && f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(i, _)| i)?;

    let transfer = indexed()
        .find(|(_, f)| {
            f.queue_count > 0
                && f.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && !f.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map_or(graphics, |(i, _)| i);

    let present = match present_support {
        Some(supports) => indexed()
            .find(|(i, f)| f.queue_count > 0 && supports(*i))
            .map(|(i, _)| i)?,
        None => graphics,
    };

    Some(QueueFamilyIndices {
        graphics,
        present,
        transfer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    const ALL: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw()
            | vk::QueueFlags::COMPUTE.as_raw()
            | vk::QueueFlags::TRANSFER.as_raw(),
    );

    #[test]
    fn single_family_device_shares_everything() {
        let families = [family(ALL)];
        let indices = select_queue_families(&families, Some(&|_: u32| true)).unwrap();
        assert_eq!(
            indices,
            QueueFamilyIndices {
                graphics: 0,
                present: 0,
                transfer: 0
            }
        );
        assert_eq!(indices.unique(), vec![0]);
        assert_eq!(indices.sharing().0, vk::SharingMode::EXCLUSIVE);
        assert_eq!(indices.upload_sharing().0, vk::SharingMode::EXCLUSIVE);
    }

    #[test]
    fn dedicated_transfer_family_is_preferred() {
        let families = [
            family(ALL),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = select_queue_families(&families, Some(&|i: u32| i == 0)).unwrap();
        assert_eq!(indices.graphics, 0);
        assert_eq!(indices.transfer, 1);
        assert_eq!(indices.present, 0);

        let (mode, shared) = indices.sharing();
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(shared, vec![0, 1]);
        assert_eq!(indices.upload_sharing(), (vk::SharingMode::CONCURRENT, vec![0, 1]));
    }

    #[test]
    fn present_may_differ_from_graphics() {
        let families = [family(ALL), family(vk::QueueFlags::COMPUTE)];
        let indices = select_queue_families(&families, Some(&|i: u32| i == 1)).unwrap();
        assert_eq!(indices.present, 1);
        assert_eq!(indices.transfer, 0);
        assert_eq!(indices.unique(), vec![0, 1]);
        // Upload stays exclusive when transfer and graphics coincide
        assert_eq!(indices.upload_sharing().0, vk::SharingMode::EXCLUSIVE);
    }

    #[test]
    fn no_graphics_family_fails() {
        let families = [family(vk::QueueFlags::TRANSFER)];
        assert!(select_queue_families(&families, Some(&|_: u32| true)).is_none());
    }

    #[test]
    fn no_present_family_fails() {
        let families = [family(ALL)];
        assert!(select_queue_families(&families, Some(&|_: u32| false)).is_none());
    }

    #[test]
    fn headless_present_uses_graphics() {
        let families = [family(vk::QueueFlags::TRANSFER), family(ALL)];
        let indices = select_queue_families(&families, None).unwrap();
        assert_eq!(indices.graphics, 1);
        assert_eq!(indices.present, 1);
        assert_eq!(indices.transfer, 0);
    }

    #[test]
    fn empty_families_are_skipped() {
        let mut empty = family(ALL);
        empty.queue_count = 0;
        let families = [empty, family(ALL)];
        let indices = select_queue_families(&families, Some(&|_: u32| true)).unwrap();
        assert_eq!(indices.graphics, 1);
        assert_eq!(indices.present, 1);
    }
}
