//! NIF entry points
//!
//! Scenes live in a global slab and are addressed by u64 handles. Errors
//! come back to Elixir as `{:error, reason}` with the error's message.

use std::time::Duration;

use rustler::{Atom, Error, NifResult};

use crate::config::{AntennaConfig, BeamformingConfig, SceneConfig};
use crate::device::NodeId;
use crate::error::MmWaveError;
use crate::geometry::Vector3;
use crate::propagation::ChannelCondition;
use crate::scene::{ChannelSummary, Scene};
use crate::SCENES;

mod atoms {
    rustler::atoms! {
        ok,
    }
}

fn scene_not_found() -> Error {
    Error::Term(Box::new("scene_not_found"))
}

fn to_term(err: MmWaveError) -> Error {
    Error::Term(Box::new(err.to_string()))
}

/// Run `f` against the scene behind `handle`
fn with_scene<F, R>(handle: u64, f: F) -> NifResult<R>
where
    F: FnOnce(&mut Scene) -> Result<R, MmWaveError>,
{
    SCENES
        .with_mut(handle, f)
        .ok_or_else(scene_not_found)?
        .map_err(to_term)
}

/// Creates a scene and returns its handle.
#[rustler::nif]
fn scene_new(config: SceneConfig) -> NifResult<(Atom, u64)> {
    let scene = Scene::new(&config).map_err(to_term)?;
    match SCENES.insert(scene) {
        Some(handle) => Ok((atoms::ok(), handle)),
        None => Err(Error::Term(Box::new("slab_full"))),
    }
}

/// Drop the scene behind `handle`; unknown and already destroyed handles
/// are `scene_not_found`
fn remove_scene(handle: u64) -> NifResult<()> {
    SCENES.remove(handle).map(drop).ok_or_else(scene_not_found)
}

/// Destroys a scene and frees its slot.
#[rustler::nif]
fn scene_destroy(handle: u64) -> NifResult<Atom> {
    remove_scene(handle)?;
    Ok(atoms::ok())
}

/// Returns the number of live scenes.
#[rustler::nif]
fn scene_count() -> NifResult<u64> {
    Ok(SCENES.count() as u64)
}

#[rustler::nif]
fn add_device(
    handle: u64,
    id: u32,
    position: (f64, f64, f64),
    antenna: AntennaConfig,
    beamforming: BeamformingConfig,
) -> NifResult<Atom> {
    with_scene(handle, |scene| {
        scene.add_device(NodeId(id), position.into(), &antenna, &beamforming)
    })?;
    Ok(atoms::ok())
}

#[rustler::nif]
fn set_mobility(
    handle: u64,
    id: u32,
    position: (f64, f64, f64),
    velocity: (f64, f64, f64),
) -> NifResult<Atom> {
    with_scene(handle, |scene| {
        scene.set_mobility(
            NodeId(id),
            Vector3::from(position),
            Vector3::from(velocity),
        )
    })?;
    Ok(atoms::ok())
}

#[rustler::nif]
fn set_condition(handle: u64, a: u32, b: u32, los: bool, o2i: bool) -> NifResult<Atom> {
    with_scene(handle, |scene| {
        scene.set_condition(NodeId(a), NodeId(b), ChannelCondition { los, o2i })
    })?;
    Ok(atoms::ok())
}

/// Moves simulation time to `now_ns` nanoseconds.
#[rustler::nif]
fn advance_to(handle: u64, now_ns: u64) -> NifResult<Atom> {
    with_scene(handle, |scene| {
        scene.advance_to(Duration::from_nanos(now_ns));
        Ok(())
    })?;
    Ok(atoms::ok())
}

#[rustler::nif]
fn set_beamforming(handle: u64, own: u32, peer: u32, layer: u8) -> NifResult<Atom> {
    with_scene(handle, |scene| {
        scene.set_beamforming_vector(NodeId(own), NodeId(peer), layer)
    })?;
    Ok(atoms::ok())
}

#[rustler::nif]
fn set_slot_bundle(handle: u64, own: u32, peers: Vec<u32>, layers: Vec<u8>) -> NifResult<Atom> {
    let peers: Vec<NodeId> = peers.into_iter().map(NodeId).collect();
    with_scene(handle, |scene| {
        scene.set_slot_bundle(NodeId(own), &peers, &layers)
    })?;
    Ok(atoms::ok())
}

#[rustler::nif]
fn set_omni(handle: u64, id: u32) -> NifResult<Atom> {
    with_scene(handle, |scene| scene.change_to_omni(NodeId(id)))?;
    Ok(atoms::ok())
}

/// Per-subband received PSD for a flat transmit PSD, pathloss excluded.
#[rustler::nif]
fn received_spectrum(
    handle: u64,
    tx: u32,
    rx: u32,
    tx_psd: f64,
    tx_layer: u8,
    rx_layer: u8,
) -> NifResult<(Atom, Vec<f64>)> {
    let spectrum = with_scene(handle, |scene| {
        scene.received_spectrum(NodeId(tx), NodeId(rx), tx_psd, tx_layer, rx_layer)
    })?;
    Ok((atoms::ok(), spectrum.values().to_vec()))
}

#[rustler::nif]
fn channel_summary(handle: u64, a: u32, b: u32) -> NifResult<(Atom, ChannelSummary)> {
    let summary = with_scene(handle, |scene| scene.channel_summary(NodeId(a), NodeId(b)))?;
    Ok((atoms::ok(), summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scene() -> u64 {
        let scene = Scene::new(&SceneConfig::default()).unwrap();
        SCENES.insert(scene).unwrap()
    }

    #[test]
    fn test_destroy_twice_is_not_found() {
        let handle = make_scene();
        assert!(remove_scene(handle).is_ok());
        assert!(matches!(remove_scene(handle), Err(Error::Term(_))));
    }

    #[test]
    fn test_destroyed_handle_rejects_calls() {
        let handle = make_scene();
        remove_scene(handle).unwrap();
        let result = with_scene(handle, |scene| Ok(scene.device_count()));
        assert!(matches!(result, Err(Error::Term(_))));
    }

    #[test]
    fn test_unknown_handle_is_not_found() {
        assert!(matches!(remove_scene(u64::MAX), Err(Error::Term(_))));
    }
}
