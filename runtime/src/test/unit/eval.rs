use std::sync::Arc;

use slinky_ir::{
    buffer_max, buffer_min, Allocate, Block, CallStmt, CallTarget, Check, CopyStmt, CropDim,
    DimExpr, Expr, IfThenElse, IntervalExpr, LetStmt, Loop, LoopMode, MemoryType, NodeContext,
    SliceDim, Stmt,
};

use crate::buffer::OwnedBuffer;
use crate::eval::{evaluate, EvalContext, CHECK_FAILED};

fn callback(
    f: impl Fn(&[slinky_ir::RawBuffer], &mut [slinky_ir::RawBuffer]) -> i64 + Send + Sync + 'static,
) -> CallTarget {
    CallTarget::Callback(Arc::new(f))
}

#[test]
fn serial_loop_writes_every_point() {
    let mut ctx = NodeContext::new();
    let out = ctx.insert("out");
    let x = ctx.insert("x");

    let body = CropDim::make(
        out,
        0,
        IntervalExpr::point(Expr::var(x)),
        CallStmt::make(
            callback(|_ins, outs| {
                let o = &outs[0];
                for i in o.dims[0].begin()..o.dims[0].end() {
                    o.set::<i32>(&[i], (i * 3) as i32);
                }
                0
            }),
            vec![],
            vec![out],
        ),
    );
    let s = Loop::make(x, LoopMode::Serial, IntervalExpr::new(0.into(), 9.into()), 1.into(), body);

    let buf = OwnedBuffer::for_type::<i32>(&[(0, 10)]);
    let mut ectx = EvalContext::new();
    ectx.set_buffer(out, buf.raw().clone());

    assert_eq!(evaluate(&s, &mut ectx), 0);
    for i in 0..10 {
        assert_eq!(buf.get::<i32>(&[i]), (i * 3) as i32);
    }
}

#[test]
fn crops_narrow_the_callback_view() {
    let mut ctx = NodeContext::new();
    let out = ctx.insert("out");

    let s = CropDim::make(
        out,
        0,
        IntervalExpr::new(3.into(), 5.into()),
        CallStmt::make(
            callback(|_ins, outs| {
                let o = &outs[0];
                assert_eq!(o.dims[0].min, 3);
                assert_eq!(o.dims[0].extent, 3);
                for i in o.dims[0].begin()..o.dims[0].end() {
                    o.set::<i32>(&[i], 1);
                }
                0
            }),
            vec![],
            vec![out],
        ),
    );

    let buf = OwnedBuffer::for_type::<i32>(&[(0, 10)]);
    let mut ectx = EvalContext::new();
    ectx.set_buffer(out, buf.raw().clone());

    assert_eq!(evaluate(&s, &mut ectx), 0);
    let written: Vec<i32> = (0..10).map(|i| buf.get::<i32>(&[i])).collect();
    assert_eq!(written, vec![0, 0, 0, 1, 1, 1, 0, 0, 0, 0]);
}

#[test]
fn allocate_provides_scratch_storage() {
    let mut ctx = NodeContext::new();
    let tmp = ctx.insert("tmp");
    let out = ctx.insert("out");

    let dims = vec![DimExpr {
        bounds: IntervalExpr::new(0.into(), 9.into()),
        stride: Expr::constant(4),
        fold_factor: Expr::undefined(),
    }];
    let fill = CallStmt::make(
        callback(|_ins, outs| {
            let o = &outs[0];
            for i in o.dims[0].begin()..o.dims[0].end() {
                o.set::<i32>(&[i], i as i32 + 1);
            }
            0
        }),
        vec![],
        vec![tmp],
    );
    let sum = CallStmt::make(
        callback(|ins, outs| {
            let t = &ins[0];
            let mut acc = 0i32;
            for i in t.dims[0].begin()..t.dims[0].end() {
                acc += t.get::<i32>(&[i]);
            }
            outs[0].set::<i32>(&[0], acc);
            0
        }),
        vec![tmp],
        vec![out],
    );
    let s = Allocate::make(tmp, MemoryType::Heap, 4, dims, Block::make(fill, sum));

    let buf = OwnedBuffer::for_type::<i32>(&[(0, 1)]);
    let mut ectx = EvalContext::new();
    ectx.set_buffer(out, buf.raw().clone());

    assert_eq!(evaluate(&s, &mut ectx), 0);
    assert_eq!(buf.get::<i32>(&[0]), (1..=10).sum::<i32>());
}

#[test]
fn folded_allocation_wraps_storage() {
    let mut ctx = NodeContext::new();
    let tmp = ctx.insert("tmp");

    // 100 logical elements folded to 4: writes to congruent coordinates
    // land in the same cell.
    let dims = vec![DimExpr {
        bounds: IntervalExpr::new(0.into(), 99.into()),
        stride: Expr::constant(4),
        fold_factor: Expr::constant(4),
    }];
    let body = CallStmt::make(
        callback(|_ins, outs| {
            let o = &outs[0];
            o.set::<i32>(&[2], 7);
            assert_eq!(o.get::<i32>(&[2 + 4]), 7);
            assert_eq!(o.get::<i32>(&[2 + 96]), 7);
            0
        }),
        vec![],
        vec![tmp],
    );
    let s = Allocate::make(tmp, MemoryType::Heap, 4, dims, body);
    assert_eq!(evaluate(&s, &mut EvalContext::new()), 0);
}

#[test]
fn checks_stop_evaluation() {
    let mut ctx = NodeContext::new();
    let out = ctx.insert("out");

    let failing = Check::make(Expr::lt(buffer_max(Expr::var(out), 0), 5.into()));
    let never_runs = CallStmt::make(callback(|_, _| panic!("must not run")), vec![], vec![out]);
    let s = Block::make(failing, never_runs);

    let buf = OwnedBuffer::for_type::<i32>(&[(0, 10)]);
    let mut ectx = EvalContext::new();
    ectx.set_buffer(out, buf.raw().clone());
    assert_eq!(evaluate(&s, &mut ectx), CHECK_FAILED);
}

#[test]
fn passing_checks_read_buffer_metadata() {
    let mut ctx = NodeContext::new();
    let out = ctx.insert("out");

    let s = Stmt::block(vec![
        Check::make(Expr::le(buffer_min(Expr::var(out), 0), 0.into())),
        Check::make(Expr::ge(buffer_max(Expr::var(out), 0), 9.into())),
        // Unfolded buffers accept any extent.
        Check::make(Expr::le(10.into(), slinky_ir::buffer_fold_factor(Expr::var(out), 0))),
    ]);

    let buf = OwnedBuffer::for_type::<i32>(&[(0, 10)]);
    let mut ectx = EvalContext::new();
    ectx.set_buffer(out, buf.raw().clone());
    assert_eq!(evaluate(&s, &mut ectx), 0);
}

#[test]
fn callback_errors_propagate() {
    let mut ctx = NodeContext::new();
    let out = ctx.insert("out");
    let s = CallStmt::make(callback(|_, _| 42), vec![], vec![out]);

    let buf = OwnedBuffer::for_type::<i32>(&[(0, 1)]);
    let mut ectx = EvalContext::new();
    ectx.set_buffer(out, buf.raw().clone());
    assert_eq!(evaluate(&s, &mut ectx), 42);
}

#[test]
fn let_and_if_control_flow() {
    let mut ctx = NodeContext::new();
    let t = ctx.insert("t");

    let s = LetStmt::make(
        t,
        Expr::constant(3),
        IfThenElse::make(
            Expr::lt(Expr::var(t), 5.into()),
            Stmt::undefined(),
            Check::make(Expr::constant(0)),
        ),
    );
    assert_eq!(evaluate(&s, &mut EvalContext::new()), 0);
}

#[test]
fn copy_with_offset_and_padding() {
    let mut ctx = NodeContext::new();
    let src = ctx.insert("src");
    let dst = ctx.insert("dst");
    let x = ctx.insert("x");

    // dst[x] = src[x - 2], padding with 9 where the source runs out.
    let s = CopyStmt::make(
        src,
        vec![Expr::var(x) - 2],
        dst,
        vec![x],
        Some(9i32.to_ne_bytes().to_vec()),
    );

    let src_buf = OwnedBuffer::for_type::<i32>(&[(0, 4)]);
    for i in 0..4 {
        src_buf.set::<i32>(&[i], (i + 1) as i32);
    }
    let dst_buf = OwnedBuffer::for_type::<i32>(&[(0, 6)]);

    let mut ectx = EvalContext::new();
    ectx.set_buffer(src, src_buf.raw().clone());
    ectx.set_buffer(dst, dst_buf.raw().clone());
    assert_eq!(evaluate(&s, &mut ectx), 0);

    let got: Vec<i32> = (0..6).map(|i| dst_buf.get::<i32>(&[i])).collect();
    assert_eq!(got, vec![9, 9, 1, 2, 3, 4]);
}

#[test]
fn slice_reduces_rank_for_the_body() {
    let mut ctx = NodeContext::new();
    let buf = ctx.insert("buf");

    let b = OwnedBuffer::for_type::<i32>(&[(0, 3), (0, 2)]);
    b.set::<i32>(&[1, 1], 5);

    let s = SliceDim::make(
        buf,
        1,
        Expr::constant(1),
        CallStmt::make(
            callback(|_ins, outs| {
                let o = &outs[0];
                assert_eq!(o.rank(), 1);
                assert_eq!(o.get::<i32>(&[1]), 5);
                0
            }),
            vec![],
            vec![buf],
        ),
    );
    let mut ectx = EvalContext::new();
    ectx.set_buffer(buf, b.raw().clone());
    assert_eq!(evaluate(&s, &mut ectx), 0);
}

#[test]
fn parallel_loop_matches_serial_output() {
    let mut ctx = NodeContext::new();
    let out = ctx.insert("out");
    let y = ctx.insert("y");

    let make = |mode: LoopMode| {
        let body = CropDim::make(
            out,
            1,
            IntervalExpr::point(Expr::var(y)),
            CallStmt::make(
                callback(|_ins, outs| {
                    let o = &outs[0];
                    for yy in o.dims[1].begin()..o.dims[1].end() {
                        for xx in o.dims[0].begin()..o.dims[0].end() {
                            o.set::<i32>(&[xx, yy], (xx * 100 + yy) as i32);
                        }
                    }
                    0
                }),
                vec![],
                vec![out],
            ),
        );
        Loop::make(y, mode, IntervalExpr::new(0.into(), 15.into()), 1.into(), body)
    };

    let serial_buf = OwnedBuffer::for_type::<i32>(&[(0, 8), (0, 16)]);
    let mut ectx = EvalContext::new();
    ectx.set_buffer(out, serial_buf.raw().clone());
    assert_eq!(evaluate(&make(LoopMode::Serial), &mut ectx), 0);

    let parallel_buf = OwnedBuffer::for_type::<i32>(&[(0, 8), (0, 16)]);
    let mut ectx = EvalContext::new();
    ectx.pool = Arc::new(crate::pool::StdThreadPool::new(4));
    ectx.set_buffer(out, parallel_buf.raw().clone());
    assert_eq!(evaluate(&make(LoopMode::Parallel), &mut ectx), 0);

    for yy in 0..16 {
        for xx in 0..8 {
            assert_eq!(serial_buf.get::<i32>(&[xx, yy]), parallel_buf.get::<i32>(&[xx, yy]));
        }
    }
}

#[test]
fn parallel_errors_cancel_and_propagate() {
    let mut ctx = NodeContext::new();
    let y = ctx.insert("y");
    let out = ctx.insert("out");

    let body = CallStmt::make(callback(|_, _| 7), vec![], vec![out]);
    let s = Loop::make(y, LoopMode::Parallel, IntervalExpr::new(0.into(), 63.into()), 1.into(), body);

    let buf = OwnedBuffer::for_type::<i32>(&[(0, 1)]);
    let mut ectx = EvalContext::new();
    ectx.set_buffer(out, buf.raw().clone());
    assert_eq!(evaluate(&s, &mut ectx), 7);
}
