//! Deterministic packet ordering for all progression modes.
//!
//! A packet is one `(layer, resolution, component, precinct, slice)` cell. The
//! sequencer nests the loop variables in the order the progression tag spells;
//! planar orders carry a slice count of one. Volumetric orders iterate the
//! slice axis innermost of the spatial dimensions.

use crate::codestream::ProgressionOrder;

/// One emitted packet position.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PacketId {
	pub layer: u16,
	pub resolution: u8,
	pub component: u16,
	pub precinct: u32,
	pub slice: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Dim {
	Layer,
	Resolution,
	Component,
	Precinct,
	Slice,
}

fn nesting(order: ProgressionOrder) -> [Dim; 5] {
	use Dim::*;
	match order {
		ProgressionOrder::Lrcp => [Layer, Resolution, Component, Precinct, Slice],
		ProgressionOrder::Rlcp => [Resolution, Layer, Component, Precinct, Slice],
		ProgressionOrder::Rpcl => [Resolution, Precinct, Component, Layer, Slice],
		ProgressionOrder::Pcrl => [Precinct, Component, Resolution, Layer, Slice],
		ProgressionOrder::Cprl => [Component, Precinct, Resolution, Layer, Slice],
		ProgressionOrder::Lrcps => [Layer, Resolution, Component, Precinct, Slice],
		ProgressionOrder::Rlcps => [Resolution, Layer, Component, Precinct, Slice],
		ProgressionOrder::Rpcls => [Resolution, Precinct, Component, Layer, Slice],
	}
}

/// Iterates packet ids in the order dictated by a progression mode.
///
/// The sequence is a pure function of the counts and the order, so two
/// implementations sequencing the same geometry emit identical streams.
#[derive(Clone, Debug)]
pub struct PacketSequencer {
	order: [Dim; 5],
	counts: [u32; 5],
	position: [u32; 5],
	exhausted: bool,
}

impl PacketSequencer {
	#[must_use]
	pub fn new(order: ProgressionOrder, layers: u16, resolutions: u8, components: u16, precincts: u32, slices: u32) -> Self {
		let nesting = nesting(order);
		let counts = nesting.map(|dim| match dim {
			Dim::Layer => u32::from(layers),
			Dim::Resolution => u32::from(resolutions),
			Dim::Component => u32::from(components),
			Dim::Precinct => precincts,
			Dim::Slice => slices,
		});
		let exhausted = counts.iter().any(|&count| count == 0);
		Self {
			order: nesting,
			counts,
			position: [0; 5],
			exhausted,
		}
	}

	/// Total number of packets the sequencer will emit.
	#[must_use]
	pub fn len(&self) -> u64 {
		self.counts.iter().map(|&count| u64::from(count)).product()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn current(&self) -> PacketId {
		let mut id = PacketId {
			layer: 0,
			resolution: 0,
			component: 0,
			precinct: 0,
			slice: 0,
		};
		for (dim, &value) in self.order.iter().zip(self.position.iter()) {
			match dim {
				Dim::Layer => id.layer = value as u16,
				Dim::Resolution => id.resolution = value as u8,
				Dim::Component => id.component = value as u16,
				Dim::Precinct => id.precinct = value,
				Dim::Slice => id.slice = value,
			}
		}
		id
	}
}

impl Iterator for PacketSequencer {
	type Item = PacketId;

	fn next(&mut self) -> Option<PacketId> {
		if self.exhausted {
			return None;
		}
		let id = self.current();

		// Odometer increment, innermost dimension first.
		for slot in (0..5).rev() {
			self.position[slot] += 1;
			if self.position[slot] < self.counts[slot] {
				return Some(id);
			}
			self.position[slot] = 0;
		}
		self.exhausted = true;
		Some(id)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lrcp_resolution_inside_layer() {
		let packets: Vec<PacketId> =
			PacketSequencer::new(ProgressionOrder::Lrcp, 2, 2, 1, 2, 1).collect();
		assert_eq!(packets.len(), 8);
		// Layer 0 completely precedes layer 1.
		assert!(packets[..4].iter().all(|p| p.layer == 0));
		assert!(packets[4..].iter().all(|p| p.layer == 1));
		// Within a layer, resolution 0 precedes resolution 1.
		assert_eq!(packets[0], PacketId { layer: 0, resolution: 0, component: 0, precinct: 0, slice: 0 });
		assert_eq!(packets[1], PacketId { layer: 0, resolution: 0, component: 0, precinct: 1, slice: 0 });
		assert_eq!(packets[2], PacketId { layer: 0, resolution: 1, component: 0, precinct: 0, slice: 0 });
	}

	#[test]
	fn rlcp_layer_inside_resolution() {
		let packets: Vec<PacketId> =
			PacketSequencer::new(ProgressionOrder::Rlcp, 2, 2, 1, 1, 1).collect();
		let order: Vec<(u8, u16)> = packets.iter().map(|p| (p.resolution, p.layer)).collect();
		assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
	}

	#[test]
	fn cprl_component_outermost() {
		let packets: Vec<PacketId> =
			PacketSequencer::new(ProgressionOrder::Cprl, 2, 2, 2, 1, 1).collect();
		assert!(packets[..4].iter().all(|p| p.component == 0));
		assert!(packets[4..].iter().all(|p| p.component == 1));
	}

	#[test]
	fn volumetric_slice_innermost() {
		let packets: Vec<PacketId> =
			PacketSequencer::new(ProgressionOrder::Lrcps, 1, 1, 1, 2, 3).collect();
		let order: Vec<(u32, u32)> = packets.iter().map(|p| (p.precinct, p.slice)).collect();
		assert_eq!(order, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
	}

	#[test]
	fn rpcls_appends_slice_innermost() {
		let packets: Vec<PacketId> =
			PacketSequencer::new(ProgressionOrder::Rpcls, 2, 1, 1, 2, 2).collect();
		// planar RPCL nesting, with both slices of a cell emitted back to back
		let order: Vec<(u32, u16, u32)> = packets.iter().map(|p| (p.precinct, p.layer, p.slice)).collect();
		assert_eq!(
			order,
			vec![(0, 0, 0), (0, 0, 1), (0, 1, 0), (0, 1, 1), (1, 0, 0), (1, 0, 1), (1, 1, 0), (1, 1, 1)]
		);
	}

	#[test]
	fn total_count_is_product() {
		let sequencer = PacketSequencer::new(ProgressionOrder::Rpcl, 3, 4, 2, 5, 1);
		assert_eq!(sequencer.len(), 120);
		assert_eq!(sequencer.count(), 120);
	}

	#[test]
	fn zero_dimension_yields_nothing() {
		let mut sequencer = PacketSequencer::new(ProgressionOrder::Lrcp, 0, 1, 1, 1, 1);
		assert!(sequencer.next().is_none());
	}

	#[test]
	fn sequences_are_reproducible() {
		let first: Vec<PacketId> = PacketSequencer::new(ProgressionOrder::Pcrl, 2, 3, 2, 4, 1).collect();
		let second: Vec<PacketId> = PacketSequencer::new(ProgressionOrder::Pcrl, 2, 3, 2, 4, 1).collect();
		assert_eq!(first, second);
	}
}
