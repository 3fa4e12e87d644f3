//! Host-API operation ids and argument shapes
//!
//! The tracer cares about a subset of the HIP API id space: the kernel-launch
//! family (which carries a function pointer for name resolution), the ops
//! whose argument union carries a stream, and a handful of book-keeping ids
//! that are filtered out before any work because recording them distorts the
//! timeline.

/// Host-API operations with dedicated handling
///
/// Discriminants are the callback `call_id` values of the runtime. Ids not
/// listed here are still traced generically (no stream, no kernel name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HostApiId {
    PushCallConfiguration = 1,
    PopCallConfiguration = 2,
    DeviceEnablePeerAccess = 3,
    ImportExternalMemory = 4,
    DestroyExternalMemory = 5,

    LaunchKernel = 10,
    ModuleLaunchKernel = 11,
    LaunchCooperativeKernel = 12,
    ExtLaunchKernel = 13,
    ExtModuleLaunchKernel = 14,

    MemcpyAsync = 20,
    MemcpyHtoDAsync = 21,
    MemcpyDtoHAsync = 22,
    MemcpyDtoDAsync = 23,
    MemsetAsync = 24,
    MemPrefetchAsync = 25,

    StreamSynchronize = 30,
    StreamWaitEvent = 31,
    StreamDestroy = 32,
    StreamQuery = 33,
    EventRecord = 34,
}

impl HostApiId {
    pub fn from_u32(value: u32) -> Option<Self> {
        use HostApiId::*;
        Some(match value {
            1 => PushCallConfiguration,
            2 => PopCallConfiguration,
            3 => DeviceEnablePeerAccess,
            4 => ImportExternalMemory,
            5 => DestroyExternalMemory,
            10 => LaunchKernel,
            11 => ModuleLaunchKernel,
            12 => LaunchCooperativeKernel,
            13 => ExtLaunchKernel,
            14 => ExtModuleLaunchKernel,
            20 => MemcpyAsync,
            21 => MemcpyHtoDAsync,
            22 => MemcpyDtoHAsync,
            23 => MemcpyDtoDAsync,
            24 => MemsetAsync,
            25 => MemPrefetchAsync,
            30 => StreamSynchronize,
            31 => StreamWaitEvent,
            32 => StreamDestroy,
            33 => StreamQuery,
            34 => EventRecord,
            _ => return None,
        })
    }

    /// Internal book-keeping calls excluded from the timeline entirely
    pub fn is_excluded(self) -> bool {
        matches!(
            self,
            HostApiId::PushCallConfiguration
                | HostApiId::PopCallConfiguration
                | HostApiId::DeviceEnablePeerAccess
                | HostApiId::ImportExternalMemory
                | HostApiId::DestroyExternalMemory
        )
    }

    /// Kernel-launch ids, whose arguments resolve to a kernel name
    pub fn is_launch(self) -> bool {
        matches!(
            self,
            HostApiId::LaunchKernel
                | HostApiId::ModuleLaunchKernel
                | HostApiId::LaunchCooperativeKernel
                | HostApiId::ExtLaunchKernel
                | HostApiId::ExtModuleLaunchKernel
        )
    }

    /// Canonical operation name as the runtime spells it
    pub fn name(self) -> &'static str {
        use HostApiId::*;
        match self {
            PushCallConfiguration => "__hipPushCallConfiguration",
            PopCallConfiguration => "__hipPopCallConfiguration",
            DeviceEnablePeerAccess => "hipDeviceEnablePeerAccess",
            ImportExternalMemory => "hipImportExternalMemory",
            DestroyExternalMemory => "hipDestroyExternalMemory",
            LaunchKernel => "hipLaunchKernel",
            ModuleLaunchKernel => "hipModuleLaunchKernel",
            LaunchCooperativeKernel => "hipLaunchCooperativeKernel",
            ExtLaunchKernel => "hipExtLaunchKernel",
            ExtModuleLaunchKernel => "hipExtModuleLaunchKernel",
            MemcpyAsync => "hipMemcpyAsync",
            MemcpyHtoDAsync => "hipMemcpyHtoDAsync",
            MemcpyDtoHAsync => "hipMemcpyDtoHAsync",
            MemcpyDtoDAsync => "hipMemcpyDtoDAsync",
            MemsetAsync => "hipMemsetAsync",
            MemPrefetchAsync => "hipMemPrefetchAsync",
            StreamSynchronize => "hipStreamSynchronize",
            StreamWaitEvent => "hipStreamWaitEvent",
            StreamDestroy => "hipStreamDestroy",
            StreamQuery => "hipStreamQuery",
            EventRecord => "hipEventRecord",
        }
    }
}

/// Argument payload of a host-API call, reduced to what the tracer reads
///
/// Pointers are carried as `usize`: the tracer never dereferences a stream
/// handle, it only groups by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiArgs {
    /// Kernel launch: function pointer for name lookup plus the stream
    Launch { function: usize, stream: usize },
    /// Any API whose argument union carries a stream
    Stream { stream: usize },
    /// No stream in the argument union
    None,
}

impl ApiArgs {
    /// The queue handle recorded with the call event (0 when absent)
    pub fn queue_handle(&self) -> usize {
        match *self {
            ApiArgs::Launch { stream, .. } => stream,
            ApiArgs::Stream { stream } => stream,
            ApiArgs::None => 0,
        }
    }

    /// The kernel function pointer, for launch ids only
    pub fn function_address(&self) -> Option<usize> {
        match *self {
            ApiArgs::Launch { function, .. } => Some(function),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excluded_set() {
        assert!(HostApiId::PushCallConfiguration.is_excluded());
        assert!(HostApiId::DeviceEnablePeerAccess.is_excluded());
        assert!(HostApiId::ImportExternalMemory.is_excluded());
        assert!(!HostApiId::LaunchKernel.is_excluded());
        assert!(!HostApiId::MemcpyAsync.is_excluded());
    }

    #[test]
    fn test_launch_set() {
        assert!(HostApiId::LaunchKernel.is_launch());
        assert!(HostApiId::ExtModuleLaunchKernel.is_launch());
        assert!(!HostApiId::MemcpyAsync.is_launch());
    }

    #[test]
    fn test_round_trip_ids() {
        for id in [
            HostApiId::LaunchKernel,
            HostApiId::MemcpyAsync,
            HostApiId::StreamSynchronize,
            HostApiId::PopCallConfiguration,
        ] {
            assert_eq!(HostApiId::from_u32(id as u32), Some(id));
        }
        assert_eq!(HostApiId::from_u32(9999), None);
    }

    #[test]
    fn test_queue_handle_extraction() {
        let launch = ApiArgs::Launch {
            function: 0xdead,
            stream: 0x10,
        };
        assert_eq!(launch.queue_handle(), 0x10);
        assert_eq!(launch.function_address(), Some(0xdead));

        let stream = ApiArgs::Stream { stream: 0x20 };
        assert_eq!(stream.queue_handle(), 0x20);
        assert_eq!(stream.function_address(), None);

        assert_eq!(ApiArgs::None.queue_handle(), 0);
    }
}
