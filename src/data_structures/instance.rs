//! Placement of a renderable in the scene.
//!
//! An [`Instance`] does not own what it draws: it refers to a mesh, a scene
//! asset or another node and only contributes a transform. Drawing the same
//! mesh through several instances is how geometry is reused without copying.

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    data_structures::scene_graph::NodeRef,
    render::{Frame, RenderState, Renderable},
};

#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    renderable: NodeRef,
    matrix: Matrix4<f32>,
}

impl Instance {
    /// Create a new instance with identity transformation.
    pub fn new(renderable: impl Into<NodeRef>) -> Self {
        Self {
            renderable: renderable.into(),
            matrix: Matrix4::identity(),
        }
    }

    pub fn with_matrix(renderable: impl Into<NodeRef>, matrix: Matrix4<f32>) -> Self {
        Self {
            renderable: renderable.into(),
            matrix,
        }
    }

    pub fn renderable(&self) -> NodeRef {
        self.renderable
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        self.matrix
    }

    pub fn set_matrix(&mut self, matrix: Matrix4<f32>) {
        self.matrix = matrix;
    }

    /// Post-multiplies `transform`, i.e. applies it in the instance's local
    /// coordinate system.
    pub fn transform_local(&mut self, transform: Matrix4<f32>) {
        self.matrix = self.matrix * transform;
    }
}

impl Renderable for Instance {
    fn render(&self, frame: &mut Frame<'_>, state: &RenderState) {
        let inner = state.with_modelview(state.modelview * self.matrix);
        frame.render(self.renderable, &inner);
    }
}
