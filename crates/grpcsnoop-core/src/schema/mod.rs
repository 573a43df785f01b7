//! Method registry: maps a gRPC `:path` to request/response decoders
//! (spec.md §4.7). Grounded on two sources at once — the teacher's
//! `PajamaxService::request_parse_fn_by_path` (a `fn(&[u8]) -> Result<R, _>`
//! pointer looked up by path) and the original implementation's
//! `serviceMsgs map[string][]proto.Message`, which is a request/response
//! pair keyed the same way.

pub mod containerd;
pub mod cri;

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::sync::{Mutex, OnceLock};

use crate::error::DecodeError;

/// Erased decode entry point: every method's concrete request/response type
/// is hidden behind this function pointer, selected once at registry
/// build time.
pub type DecodeFn = fn(&[u8]) -> Result<Box<dyn Debug + Send>, DecodeError>;

#[derive(Clone, Copy)]
pub struct MethodSchema {
    pub request: DecodeFn,
    pub response: DecodeFn,
}

fn decode_as<M>(buf: &[u8]) -> Result<Box<dyn Debug + Send>, DecodeError>
where
    M: prost::Message + Default + Debug + Send + 'static,
{
    Ok(Box::new(M::decode(buf)?))
}

/// Look up the schema for a gRPC method path (e.g.
/// `/containerd.services.version.v1.Version/Version`).
pub fn lookup(method: &str) -> Option<MethodSchema> {
    REGISTRY.get_or_init(build_registry).get(method).copied()
}

static REGISTRY: OnceLock<HashMap<&'static str, MethodSchema>> = OnceLock::new();

/// Record that `method` had no registry entry. Returns `true` the first
/// time a given path is seen so the caller logs exactly once per path
/// (spec.md §4.7, §7 "Schema-missing"), even across many messages on the
/// same or different streams.
pub fn mark_unknown_logged(method: &str) -> bool {
    WARNED_UNKNOWN
        .get_or_init(|| Mutex::new(HashSet::new()))
        .lock()
        .unwrap()
        .insert(method.to_string())
}

static WARNED_UNKNOWN: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

macro_rules! entry {
    ($map:expr, $path:expr, $req:ty, $resp:ty) => {
        $map.insert(
            $path,
            MethodSchema {
                request: decode_as::<$req>,
                response: decode_as::<$resp>,
            },
        );
    };
}

fn build_registry() -> HashMap<&'static str, MethodSchema> {
    use containerd as c;
    use cri as r;

    let mut m = HashMap::new();

    // Containers (6)
    entry!(m, "/containerd.services.containers.v1.Containers/Get", c::GetContainerRequest, c::GetContainerResponse);
    entry!(m, "/containerd.services.containers.v1.Containers/List", c::ListContainersRequest, c::ListContainersResponse);
    entry!(m, "/containerd.services.containers.v1.Containers/ListStream", c::ListContainersRequest, c::ListContainersResponse);
    entry!(m, "/containerd.services.containers.v1.Containers/Create", c::CreateContainerRequest, c::CreateContainerResponse);
    entry!(m, "/containerd.services.containers.v1.Containers/Update", c::UpdateContainerRequest, c::UpdateContainerResponse);
    entry!(m, "/containerd.services.containers.v1.Containers/Delete", c::DeleteContainerRequest, c::Empty);

    // Content (9)
    entry!(m, "/containerd.services.content.v1.Content/Info", c::InfoRequest, c::InfoResponse);
    entry!(m, "/containerd.services.content.v1.Content/Update", c::UpdateRequest, c::UpdateResponse);
    entry!(m, "/containerd.services.content.v1.Content/List", c::ListContentRequest, c::ListContentResponse);
    entry!(m, "/containerd.services.content.v1.Content/Delete", c::DeleteContentRequest, c::Empty);
    entry!(m, "/containerd.services.content.v1.Content/Read", c::ReadContentRequest, c::ReadContentResponse);
    entry!(m, "/containerd.services.content.v1.Content/Status", c::StatusRequest, c::StatusResponse);
    entry!(m, "/containerd.services.content.v1.Content/ListStatuses", c::ListStatusesRequest, c::ListStatusesResponse);
    entry!(m, "/containerd.services.content.v1.Content/Write", c::WriteContentRequest, c::WriteContentResponse);
    entry!(m, "/containerd.services.content.v1.Content/Abort", c::AbortRequest, c::Empty);

    // Diff (2)
    entry!(m, "/containerd.services.diff.v1.Diff/Apply", c::ApplyRequest, c::ApplyResponse);
    entry!(m, "/containerd.services.diff.v1.Diff/Diff", c::DiffRequest, c::DiffResponse);

    // Images (5)
    entry!(m, "/containerd.services.images.v1.Images/Get", c::GetImageRequest, c::GetImageResponse);
    entry!(m, "/containerd.services.images.v1.Images/List", c::ListImagesRequest, c::ListImagesResponse);
    entry!(m, "/containerd.services.images.v1.Images/Create", c::CreateImageRequest, c::CreateImageResponse);
    entry!(m, "/containerd.services.images.v1.Images/Update", c::UpdateImageRequest, c::UpdateImageResponse);
    entry!(m, "/containerd.services.images.v1.Images/Delete", c::DeleteImageRequest, c::Empty);

    // Introspection (1)
    entry!(m, "/containerd.services.introspection.v1.Introspection/Plugins", c::PluginsRequest, c::PluginsResponse);

    // Leases (3)
    entry!(m, "/containerd.services.leases.v1.Leases/Create", c::CreateLeaseRequest, c::CreateLeaseResponse);
    entry!(m, "/containerd.services.leases.v1.Leases/Delete", c::DeleteLeaseRequest, c::Empty);
    entry!(m, "/containerd.services.leases.v1.Leases/List", c::ListLeasesRequest, c::ListLeasesResponse);

    // Snapshots (9)
    entry!(m, "/containerd.services.snapshots.v1.Snapshots/Prepare", c::PrepareSnapshotRequest, c::PrepareSnapshotResponse);
    entry!(m, "/containerd.services.snapshots.v1.Snapshots/View", c::ViewSnapshotRequest, c::ViewSnapshotResponse);
    entry!(m, "/containerd.services.snapshots.v1.Snapshots/Mounts", c::MountsRequest, c::MountsResponse);
    entry!(m, "/containerd.services.snapshots.v1.Snapshots/Commit", c::CommitSnapshotRequest, c::Empty);
    entry!(m, "/containerd.services.snapshots.v1.Snapshots/Remove", c::RemoveSnapshotRequest, c::Empty);
    entry!(m, "/containerd.services.snapshots.v1.Snapshots/Stat", c::StatSnapshotRequest, c::StatSnapshotResponse);
    entry!(m, "/containerd.services.snapshots.v1.Snapshots/Update", c::UpdateSnapshotRequest, c::UpdateSnapshotResponse);
    entry!(m, "/containerd.services.snapshots.v1.Snapshots/List", c::ListSnapshotsRequest, c::ListSnapshotsResponse);
    entry!(m, "/containerd.services.snapshots.v1.Snapshots/Usage", c::UsageRequest, c::UsageResponse);

    // Namespaces (5)
    entry!(m, "/containerd.services.namespaces.v1.Namespaces/Get", c::GetNamespaceRequest, c::GetNamespaceResponse);
    entry!(m, "/containerd.services.namespaces.v1.Namespaces/List", c::ListNamespacesRequest, c::ListNamespacesResponse);
    entry!(m, "/containerd.services.namespaces.v1.Namespaces/Create", c::CreateNamespaceRequest, c::CreateNamespaceResponse);
    entry!(m, "/containerd.services.namespaces.v1.Namespaces/Update", c::UpdateNamespaceRequest, c::UpdateNamespaceResponse);
    entry!(m, "/containerd.services.namespaces.v1.Namespaces/Delete", c::DeleteNamespaceRequest, c::Empty);

    // Events (3)
    entry!(m, "/containerd.services.events.v1.Events/Publish", c::PublishRequest, c::Empty);
    entry!(m, "/containerd.services.events.v1.Events/Forward", c::ForwardRequest, c::Empty);
    entry!(m, "/containerd.services.events.v1.Events/Subscribe", c::SubscribeRequest, c::Envelope);

    // Version (1)
    entry!(m, "/containerd.services.version.v1.Version/Version", c::Empty, c::VersionResponse);

    // Tasks (17)
    entry!(m, "/containerd.services.tasks.v1.Tasks/Create", c::CreateTaskRequest, c::CreateTaskResponse);
    entry!(m, "/containerd.services.tasks.v1.Tasks/Start", c::StartRequest, c::StartResponse);
    entry!(m, "/containerd.services.tasks.v1.Tasks/Delete", c::DeleteTaskRequest, c::DeleteResponse);
    entry!(m, "/containerd.services.tasks.v1.Tasks/DeleteProcess", c::DeleteProcessRequest, c::DeleteResponse);
    entry!(m, "/containerd.services.tasks.v1.Tasks/Get", c::GetRequest, c::GetResponse);
    entry!(m, "/containerd.services.tasks.v1.Tasks/List", c::ListTasksRequest, c::ListTasksResponse);
    entry!(m, "/containerd.services.tasks.v1.Tasks/Kill", c::KillRequest, c::Empty);
    entry!(m, "/containerd.services.tasks.v1.Tasks/Exec", c::ExecProcessRequest, c::Empty);
    entry!(m, "/containerd.services.tasks.v1.Tasks/ResizePty", c::ResizePtyRequest, c::Empty);
    entry!(m, "/containerd.services.tasks.v1.Tasks/CloseIO", c::CloseIoRequest, c::Empty);
    entry!(m, "/containerd.services.tasks.v1.Tasks/Pause", c::PauseTaskRequest, c::Empty);
    entry!(m, "/containerd.services.tasks.v1.Tasks/Resume", c::ResumeTaskRequest, c::Empty);
    entry!(m, "/containerd.services.tasks.v1.Tasks/ListPids", c::ListPidsRequest, c::ListPidsResponse);
    entry!(m, "/containerd.services.tasks.v1.Tasks/Checkpoint", c::CheckpointTaskRequest, c::CheckpointTaskResponse);
    entry!(m, "/containerd.services.tasks.v1.Tasks/Update", c::UpdateTaskRequest, c::Empty);
    entry!(m, "/containerd.services.tasks.v1.Tasks/Metrics", c::MetricsRequest, c::MetricsResponse);
    entry!(m, "/containerd.services.tasks.v1.Tasks/Wait", c::WaitRequest, c::WaitResponse);

    // CRI RuntimeService (26)
    entry!(m, "/runtime.v1.RuntimeService/Version", r::VersionRequest, r::VersionResponse);
    entry!(m, "/runtime.v1.RuntimeService/RunPodSandbox", r::RunPodSandboxRequest, r::RunPodSandboxResponse);
    entry!(m, "/runtime.v1.RuntimeService/StopPodSandbox", r::StopPodSandboxRequest, r::StopPodSandboxResponse);
    entry!(m, "/runtime.v1.RuntimeService/RemovePodSandbox", r::RemovePodSandboxRequest, r::RemovePodSandboxResponse);
    entry!(m, "/runtime.v1.RuntimeService/PodSandboxStatus", r::PodSandboxStatusRequest, r::PodSandboxStatusResponse);
    entry!(m, "/runtime.v1.RuntimeService/ListPodSandbox", r::ListPodSandboxRequest, r::ListPodSandboxResponse);
    entry!(m, "/runtime.v1.RuntimeService/CreateContainer", r::CreateContainerRequest, r::CreateContainerResponse);
    entry!(m, "/runtime.v1.RuntimeService/StartContainer", r::StartContainerRequest, r::StartContainerResponse);
    entry!(m, "/runtime.v1.RuntimeService/StopContainer", r::StopContainerRequest, r::StopContainerResponse);
    entry!(m, "/runtime.v1.RuntimeService/RemoveContainer", r::RemoveContainerRequest, r::RemoveContainerResponse);
    entry!(m, "/runtime.v1.RuntimeService/ListContainers", r::ListContainersRequest, r::ListContainersResponse);
    entry!(m, "/runtime.v1.RuntimeService/ContainerStatus", r::ContainerStatusRequest, r::ContainerStatusResponse);
    entry!(m, "/runtime.v1.RuntimeService/UpdateContainerResources", r::UpdateContainerResourcesRequest, r::UpdateContainerResourcesResponse);
    entry!(m, "/runtime.v1.RuntimeService/ReopenContainerLog", r::ReopenContainerLogRequest, r::ReopenContainerLogResponse);
    entry!(m, "/runtime.v1.RuntimeService/ExecSync", r::ExecSyncRequest, r::ExecSyncResponse);
    entry!(m, "/runtime.v1.RuntimeService/Exec", r::ExecRequest, r::ExecResponse);
    entry!(m, "/runtime.v1.RuntimeService/Attach", r::AttachRequest, r::AttachResponse);
    entry!(m, "/runtime.v1.RuntimeService/PortForward", r::PortForwardRequest, r::PortForwardResponse);
    entry!(m, "/runtime.v1.RuntimeService/ContainerStats", r::ContainerStatsRequest, r::ContainerStatsResponse);
    entry!(m, "/runtime.v1.RuntimeService/ListContainerStats", r::ListContainerStatsRequest, r::ListContainerStatsResponse);
    entry!(m, "/runtime.v1.RuntimeService/PodSandboxStats", r::PodSandboxStatsRequest, r::PodSandboxStatsResponse);
    entry!(m, "/runtime.v1.RuntimeService/ListPodSandboxStats", r::ListPodSandboxStatsRequest, r::ListPodSandboxStatsResponse);
    entry!(m, "/runtime.v1.RuntimeService/UpdateRuntimeConfig", r::UpdateRuntimeConfigRequest, r::UpdateRuntimeConfigResponse);
    entry!(m, "/runtime.v1.RuntimeService/Status", r::StatusRequest, r::StatusResponse);
    entry!(m, "/runtime.v1.RuntimeService/CheckpointContainer", r::CheckpointContainerRequest, r::CheckpointContainerResponse);
    entry!(m, "/runtime.v1.RuntimeService/ListMetricDescriptors", r::ListMetricDescriptorsRequest, r::ListMetricDescriptorsResponse);
    entry!(m, "/runtime.v1.RuntimeService/ListPodSandboxMetrics", r::ListPodSandboxMetricsRequest, r::ListPodSandboxMetricsResponse);

    // CRI ImageService (5)
    entry!(m, "/runtime.v1.ImageService/ListImages", r::ListImagesRequest, r::ListImagesResponse);
    entry!(m, "/runtime.v1.ImageService/ImageStatus", r::ImageStatusRequest, r::ImageStatusResponse);
    entry!(m, "/runtime.v1.ImageService/PullImage", r::PullImageRequest, r::PullImageResponse);
    entry!(m, "/runtime.v1.ImageService/RemoveImage", r::RemoveImageRequest, r::RemoveImageResponse);
    entry!(m, "/runtime.v1.ImageService/ImageFsInfo", r::ImageFsInfoRequest, r::ImageFsInfoResponse);

    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_method() {
        let schema = lookup("/containerd.services.version.v1.Version/Version").unwrap();
        let resp = (schema.response)(&[]).unwrap();
        // Empty buffer decodes to the all-default VersionResponse.
        assert_eq!(format!("{resp:?}"), "VersionResponse { version: \"\", revision: \"\" }");
    }

    #[test]
    fn unknown_method_is_none() {
        assert!(lookup("/not.a.Service/Method").is_none());
    }

    #[test]
    fn unknown_method_logged_only_once() {
        // Unique path so this test doesn't race other tests sharing the
        // process-wide WARNED_UNKNOWN set.
        let path = "/test.only.Unique/MarkUnknownLoggedOnlyOnce";
        assert!(mark_unknown_logged(path));
        assert!(!mark_unknown_logged(path));
        assert!(!mark_unknown_logged(path));
    }

    #[test]
    fn every_named_containerd_and_cri_service_has_at_least_one_entry() {
        let registry = build_registry();
        let prefixes = [
            "/containerd.services.containers.v1.Containers/",
            "/containerd.services.content.v1.Content/",
            "/containerd.services.diff.v1.Diff/",
            "/containerd.services.images.v1.Images/",
            "/containerd.services.introspection.v1.Introspection/",
            "/containerd.services.leases.v1.Leases/",
            "/containerd.services.snapshots.v1.Snapshots/",
            "/containerd.services.namespaces.v1.Namespaces/",
            "/containerd.services.events.v1.Events/",
            "/containerd.services.version.v1.Version/",
            "/containerd.services.tasks.v1.Tasks/",
            "/runtime.v1.RuntimeService/",
            "/runtime.v1.ImageService/",
        ];
        for prefix in prefixes {
            assert!(
                registry.keys().any(|k| k.starts_with(prefix)),
                "no registry entry for service {prefix}"
            );
        }
    }
}
