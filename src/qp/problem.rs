use na::{DMatrix, DVector};

use super::layout::VariableLayout;
use crate::types::Float;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConeKind {
    /// b - A x = 0
    Zero,
    /// b - A x >= 0
    Nonnegative,
    /// b - A x lies in {(t, x) : ‖x‖ <= t}
    SecondOrder,
}

/// `dim` consecutive constraint rows belonging to one cone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConeBlock {
    pub kind: ConeKind,
    pub dim: usize,
}

/// Convex QP of one control tick:
///     minimize    ½ xᵀ P x + qᵀ x
///     subject to  b - A x ∈ K
/// with K the product of `cones`, in row order.
#[derive(Clone, Debug)]
pub struct QpProblem {
    pub P: DMatrix<Float>,
    pub q: DVector<Float>,
    pub A: DMatrix<Float>,
    pub b: DVector<Float>,
    pub cones: Vec<ConeBlock>,
    pub layout: VariableLayout,
}

impl QpProblem {
    pub fn num_variables(&self) -> usize {
        self.q.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.b.len()
    }

    pub fn is_finite(&self) -> bool {
        self.P
            .iter()
            .chain(self.q.iter())
            .chain(self.A.iter())
            .chain(self.b.iter())
            .all(|x| x.is_finite())
    }

    /// Cost ½ xᵀ P x + qᵀ x at x.
    pub fn cost(&self, x: &DVector<Float>) -> Float {
        0.5 * x.dot(&(&self.P * x)) + self.q.dot(x)
    }

    /// Largest constraint violation at x, over all cones.
    pub fn max_violation(&self, x: &DVector<Float>) -> Float {
        let s = &self.b - &self.A * x;
        let mut row = 0;
        let mut worst: Float = 0.;
        for cone in &self.cones {
            let block = s.rows(row, cone.dim);
            let violation = match cone.kind {
                ConeKind::Zero => block.amax(),
                ConeKind::Nonnegative => (-block.min()).max(0.),
                ConeKind::SecondOrder => (block.rows(1, cone.dim - 1).norm() - block[0]).max(0.),
            };
            worst = worst.max(violation);
            row += cone.dim;
        }
        worst
    }
}

/// Accumulates constraint blocks row by row. Adjacent blocks of the same
/// zero or nonnegative kind share one cone; each second-order block is its
/// own cone.
pub struct ConstraintStack {
    num_variables: usize,
    blocks: Vec<(DMatrix<Float>, DVector<Float>)>,
    cones: Vec<ConeBlock>,
}

impl ConstraintStack {
    pub fn new(num_variables: usize) -> Self {
        ConstraintStack {
            num_variables,
            blocks: vec![],
            cones: vec![],
        }
    }

    pub fn push(&mut self, kind: ConeKind, A: DMatrix<Float>, b: DVector<Float>) {
        let dim = A.nrows();
        if dim == 0 {
            return;
        }
        debug_assert_eq!(A.ncols(), self.num_variables);
        debug_assert_eq!(b.len(), dim);

        match self.cones.last_mut() {
            Some(last) if last.kind == kind && kind != ConeKind::SecondOrder => last.dim += dim,
            _ => self.cones.push(ConeBlock { kind, dim }),
        }
        self.blocks.push((A, b));
    }

    pub fn num_rows(&self) -> usize {
        self.cones.iter().map(|c| c.dim).sum()
    }

    pub fn finish(self) -> (DMatrix<Float>, DVector<Float>, Vec<ConeBlock>) {
        let rows = self.num_rows();
        let mut A = DMatrix::zeros(rows, self.num_variables);
        let mut b = DVector::zeros(rows);
        let mut offset = 0;
        for (A_block, b_block) in &self.blocks {
            let dim = A_block.nrows();
            A.view_mut((offset, 0), (dim, self.num_variables))
                .copy_from(A_block);
            b.rows_mut(offset, dim).copy_from(b_block);
            offset += dim;
        }
        (A, b, self.cones)
    }
}

#[cfg(test)]
mod problem_tests {
    use na::{dmatrix, dvector};

    use super::*;
    use crate::assert_close;

    #[test]
    fn merges_adjacent_cones() {
        // Arrange
        let mut stack = ConstraintStack::new(2);

        // Act
        stack.push(ConeKind::Zero, dmatrix![1., 0.], dvector![1.]);
        stack.push(ConeKind::Zero, dmatrix![0., 1.], dvector![2.]);
        stack.push(ConeKind::Nonnegative, DMatrix::zeros(0, 2), DVector::zeros(0));
        stack.push(ConeKind::Nonnegative, dmatrix![1., 1.], dvector![5.]);
        stack.push(ConeKind::SecondOrder, DMatrix::identity(2, 2), dvector![0., 0.]);
        stack.push(ConeKind::SecondOrder, DMatrix::identity(2, 2), dvector![0., 0.]);
        let (A, b, cones) = stack.finish();

        // Assert
        assert_eq!(A.shape(), (7, 2));
        assert_eq!(b, dvector![1., 2., 5., 0., 0., 0., 0.]);
        assert_eq!(
            cones,
            vec![
                ConeBlock { kind: ConeKind::Zero, dim: 2 },
                ConeBlock { kind: ConeKind::Nonnegative, dim: 1 },
                ConeBlock { kind: ConeKind::SecondOrder, dim: 2 },
                ConeBlock { kind: ConeKind::SecondOrder, dim: 2 },
            ]
        );
    }

    #[test]
    fn violation_per_cone() {
        let layout = VariableLayout::new(
            3,
            0,
            0,
            0,
            &crate::relaxation::ConstraintMode::Hard,
            &crate::relaxation::ConstraintMode::Hard,
        );
        let mut stack = ConstraintStack::new(3);
        // x0 = 1
        stack.push(ConeKind::Zero, dmatrix![1., 0., 0.], dvector![1.]);
        // x1 <= 2
        stack.push(ConeKind::Nonnegative, dmatrix![0., 1., 0.], dvector![2.]);
        // ‖x1‖ <= x0, written as -x in the cone with b = 0
        stack.push(
            ConeKind::SecondOrder,
            dmatrix![-1., 0., 0.; 0., -1., 0.],
            dvector![0., 0.],
        );
        let (A, b, cones) = stack.finish();
        let problem = QpProblem {
            P: DMatrix::identity(3, 3),
            q: DVector::zeros(3),
            A,
            b,
            cones,
            layout,
        };

        assert_close!(problem.max_violation(&dvector![1., 0.5, 0.]), 0., 1e-12);
        assert_close!(problem.max_violation(&dvector![1., 1.5, 0.]), 0.5, 1e-12);
        assert_close!(problem.max_violation(&dvector![0.7, 0.5, 0.]), 0.3, 1e-12);
        assert_close!(problem.cost(&dvector![1., 2., 0.]), 2.5, 1e-12);
    }
}
