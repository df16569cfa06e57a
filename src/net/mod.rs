//! # Petri 网核心定义（Place/Transition Net）
//!
//! 设库所集合 `P` 与迁移集合 `T`。输入矩阵 `F ∈ ℕ^{|P|×|T|}`，输出矩阵
//! `H ∈ ℕ^{|T|×|P|}`，关联矩阵 `C = Hᵗ - F`。标识 `M` 的分量可以是有限值或 ω：
//!
//! * 迁移 `t` **可激发** 当且仅当对所有有限分量 `M[p] ≥ F[p][t]`（ω 永不阻塞）；
//! * **发射** 后 `M'[p] = M[p] - F[p][t] + H[t][p]`，ω 分量保持 ω。
//!
//! ## 示例
//!
//! ```rust
//! use pn_analyzer::net::*;
//!
//! let mut builder = NetBuilder::new();
//! let p0 = builder.add_place(Place::new("p0", 1));
//! let p1 = builder.add_place(Place::new("p1", 0));
//! let t0 = builder.add_transition(Transition::new("t0"));
//! builder.set_input_weight(p0, t0, 1);
//! builder.set_output_weight(p1, t0, 1);
//! let net = builder.build();
//!
//! let marking = net.initial_marking();
//! assert_eq!(net.enabled_transitions(&marking), vec![t0]);
//! let next = net.fire(&marking, t0).unwrap();
//! assert_eq!(next.tokens(p0), Tokens::Finite(0));
//! assert_eq!(next.tokens(p1), Tokens::Finite(1));
//! ```

pub mod core;
pub mod ids;
pub mod incidence;
pub mod index_vec;
pub mod io;
pub mod structure;

pub use self::core::{DiagnosticReport, FireError, MatrixKind, Net, NetBuilder, ValidationError};
pub use ids::{PlaceId, TransitionId};
pub use incidence::Incidence;
pub use index_vec::{Idx, IndexVec};
pub use io::NetLayout;
pub use structure::{Marking, Place, Tokens, Transition, Weight};
